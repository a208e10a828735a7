//! Conversational glue around synthesis: history in, summarised answer out.

use crate::error::{NlqError, Result};
use crate::history::HistoryStore;
use crate::llm::{GenerationRequest, GenerationTurn, Generator, SamplingParams};
use crate::schema::SchemaProvider;
use crate::synthesis::SynthesisController;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const SUMMARY_INSTRUCTIONS: &str = "\
You are a helpful assistant providing users with information based on database results. \
Your goal is to answer questions conversationally, summarizing the data clearly and concisely. \
When possible, display the results in a table using markdown syntax, and provide a short summary first. \
Avoid mentioning that the data comes from a SQL query, and focus on giving direct, natural responses \
to the user's question.

Markdown Table Format:
- Use \"|\" to separate columns.
- The first row should contain column headers, followed by a separator line with dashes (\"---\").
- Each subsequent row should contain the data, also separated by \"|\".

For example:

| Column 1 | Column 2 |
| --- | --- |
| Data 1 | Data 2 |

If a table format is not possible, return the results as a bulleted list or structured text.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sql_query: String,
}

/// Text stored as the assistant turn so later questions can refer back to it.
#[derive(Debug, Serialize)]
struct RecordedAnswer<'a> {
    sql_query: &'a str,
    results: &'a str,
}

pub struct Assistant {
    schema: Arc<dyn SchemaProvider>,
    history: Arc<dyn HistoryStore>,
    synthesis: SynthesisController,
    generator: Arc<dyn Generator>,
    sampling: SamplingParams,
}

impl Assistant {
    pub fn new(
        schema: Arc<dyn SchemaProvider>,
        history: Arc<dyn HistoryStore>,
        synthesis: SynthesisController,
        generator: Arc<dyn Generator>,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            schema,
            history,
            synthesis,
            generator,
            sampling,
        }
    }

    /// History is written only when every step succeeded.
    pub async fn ask(&self, session_id: &str, question: &str) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(NlqError::EmptyQuestion);
        }

        let prior = self.history.read(session_id).await?;
        info!("Session {} has {} prior turns", session_id, prior.len());

        let schema = self.schema.snapshot().await?;
        let synthesized = self.synthesis.synthesize(question, &schema, &prior).await?;
        info!("FINAL GENERATED QUERY: {}", synthesized.accepted_query);

        let answer = self.summarize(question, &synthesized.rows, &prior).await?;

        let recorded = serde_json::to_string(&RecordedAnswer {
            sql_query: &synthesized.accepted_query,
            results: &answer,
        })?;
        self.history
            .append(
                session_id,
                &[GenerationTurn::user(question), GenerationTurn::assistant(recorded)],
            )
            .await?;

        Ok(Answer {
            answer,
            sql_query: synthesized.accepted_query,
        })
    }

    /// Carries the same system instruction and prior turns as synthesis so the
    /// summary can resolve follow-up references.
    async fn summarize(
        &self,
        question: &str,
        rows: &[Vec<String>],
        prior: &[GenerationTurn],
    ) -> Result<String> {
        let prompt = format!(
            "{}\n\nQuestion: {}\n\nResults: {}",
            SUMMARY_INSTRUCTIONS,
            question,
            serde_json::to_string(rows)?
        );
        let request = GenerationRequest::new(prior, prompt)
            .with_system(self.synthesis.config().system_instruction.clone())
            .with_sampling(self.sampling);
        let output = self.generator.generate(&request).await?;
        if output.trim().is_empty() {
            return Err(NlqError::Llm("empty summary returned".to_string()));
        }
        info!("OUTPUT FROM MODEL: {}", output);
        Ok(output)
    }
}
