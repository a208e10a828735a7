//! Prompt Assembler
//!
//! Composes the generation prompt from schema, worked examples, the user
//! question and every failure note collected so far in the current call.

use crate::schema::SchemaSnapshot;

/// Built-in instruction block sent with every generation prompt.
pub const GENERATION_INSTRUCTIONS: &str = "\
Read database metadata inside the <database_metadata></database_metadata> tags to do the following:
1. Create a syntactically correct SQL query to answer the question.
2. Never query for all the columns from a specific table, only ask for a few relevant columns given the question.
3. Pay attention to use only the column names that you can see in the schema description.
4. Be careful to not query for columns that do not exist.
5. When using WHERE clauses, be careful not to search for values that do not exist in the column.
6. When using WHERE clauses, add the LOWER() function and search for all terms in lowercase.
7. If you are writing CTEs then include all the required columns.
8. While concatenating a non string column, make sure to cast the column to string.
9. For date columns compared to a string, cast the string input.
10. Return the sql query inside the <SQL></SQL> tags.

Refer to the example queries in the <sample_queries></sample_queries> tags for example output.";

/// One worked question/query pair shown to the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkedExample {
    pub question: String,
    pub query: String,
    pub expected_result: Option<String>,
}

impl WorkedExample {
    pub fn new(question: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            query: query.into(),
            expected_result: None,
        }
    }

    pub fn with_expected_result(mut self, rendered: impl Into<String>) -> Self {
        self.expected_result = Some(rendered.into());
        self
    }
}

pub fn default_examples() -> Vec<WorkedExample> {
    vec![WorkedExample::new(
        "What was the total donation amount for the March Miracle Makers campaign?",
        "SELECT SUM(d.donationamount) AS total_donation_amount \
FROM sample_donations d \
JOIN sample_campaigns c ON d.campaignkey = c.campaignkey \
WHERE LOWER(c.campaignname) LIKE '%march miracle makers%'",
    )
    .with_expected_result(
        "| total_donation_amount |\n|-----------------------|\n| 9855                  |",
    )]
}

/// A rejected candidate and the engine's reason, kept for the next attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNote {
    pub candidate: String,
    pub message: String,
}

pub struct PromptAssembler;

impl PromptAssembler {
    /// Deterministic; notes are rendered in the order given.
    pub fn build(
        question: &str,
        schema: &SchemaSnapshot,
        examples: &[WorkedExample],
        prior_failures: &[FailureNote],
    ) -> String {
        let mut parts = Vec::new();

        parts.push(GENERATION_INSTRUCTIONS.to_string());
        parts.push(format!(
            "<database_metadata>\n{}</database_metadata>",
            schema
        ));
        parts.push(format!(
            "<sample_queries>\n{}</sample_queries>",
            Self::render_examples(examples)
        ));
        parts.push(format!("<question> {} </question>", question));

        for note in prior_failures {
            parts.push(Self::render_failure(note));
        }

        parts.join("\n\n")
    }

    fn render_examples(examples: &[WorkedExample]) -> String {
        let mut out = String::from("Example SQL Queries:\n");
        for (idx, example) in examples.iter().enumerate() {
            out.push_str(&format!(
                "{}. Query: {}\n\n    {}\n",
                idx + 1,
                example.question,
                example.query
            ));
            if let Some(expected) = &example.expected_result {
                out.push_str(&format!("\n   Expected Result:\n{}\n", expected));
            }
            out.push('\n');
        }
        out
    }

    fn render_failure(note: &FailureNote) -> String {
        format!(
            "This is an error from a previously generated SQL query: {}\n\
To correct this, generate a complete alternative SQL query that fixes the error. \
Return the whole corrected query, not a diff or a partial edit.\n\
The failing query was:\n{}\n\
Make sure the updated SQL query still answers the user's question and follows the instructions above.",
            note.message, note.candidate
        )
    }
}
