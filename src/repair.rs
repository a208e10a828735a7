//! Execution Repair Controller
//!
//! Executing -> {Succeeded | Correcting -> Executing} | Exhausted.
//! A failed statement is sent to a correction service together with the intent
//! and the store's error; the reply replaces the statement wholesale.

use crate::db::store::{ExecutionPayload, StatementStore, StoreError};
use crate::error::{NlqError, Result};
use crate::execution_loop::{run_bounded, FeedbackLoop, LoopOutcome, Proposal, Verdict};
use crate::llm::{GenerationRequest, Generator, SamplingParams};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const DEFAULT_REPAIR_ATTEMPTS: u32 = 10;

/// What the correction service is told about a failed statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionRequest {
    #[serde(rename = "SQL Statement")]
    pub statement: String,
    #[serde(rename = "User question")]
    pub intent: String,
    #[serde(rename = "Error Message")]
    pub error: String,
}

/// Proposes replacement statements. `Ok(None)` or empty text means the service
/// cannot correct the statement.
#[async_trait]
pub trait CorrectionService: Send + Sync {
    async fn correct(
        &self,
        request: &CorrectionRequest,
        correlation_id: &str,
    ) -> Result<Option<String>>;
}

/// State carried across the repair loop. `statement` is always the one most
/// recently executed or about to be executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairAttempt {
    pub statement: String,
    pub attempt_index: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairResult {
    pub statement: String,
    pub payload: ExecutionPayload,
    pub attempts: u32,
}

pub struct ExecutionRepairController {
    store: Arc<dyn StatementStore>,
    corrector: Arc<dyn CorrectionService>,
    max_attempts: u32,
}

impl ExecutionRepairController {
    pub fn new(
        store: Arc<dyn StatementStore>,
        corrector: Arc<dyn CorrectionService>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            corrector,
            max_attempts,
        }
    }

    pub async fn execute(&self, statement: &str, intent: &str) -> Result<RepairResult> {
        let statement = statement.trim().trim_end_matches(';').trim_end().to_string();
        info!("Initial SQL query: {}", statement);

        let mut repair = RepairLoop {
            controller: self,
            intent,
            state: RepairAttempt {
                statement,
                attempt_index: 0,
                last_error: None,
            },
        };

        match run_bounded(&mut repair, self.max_attempts).await? {
            LoopOutcome::Accepted {
                value,
                candidate,
                attempts,
            } => Ok(RepairResult {
                statement: candidate,
                payload: value,
                attempts,
            }),
            LoopOutcome::Exhausted {
                last_candidate,
                last_feedback,
                attempts,
            } => {
                error!("Maximum retries reached. Unable to execute SQL query successfully.");
                Err(NlqError::RepairExhausted {
                    statement: last_candidate.unwrap_or(repair.state.statement),
                    error: last_feedback.unwrap_or_default(),
                    attempts,
                })
            }
        }
    }
}

struct RepairLoop<'a> {
    controller: &'a ExecutionRepairController,
    intent: &'a str,
    state: RepairAttempt,
}

#[async_trait]
impl<'a> FeedbackLoop for RepairLoop<'a> {
    type Candidate = String;
    type Accepted = ExecutionPayload;
    type Feedback = String;

    async fn propose(&mut self, attempt: u32) -> Result<Proposal<String, String>> {
        self.state.attempt_index = attempt;
        Ok(Proposal::Ready(self.state.statement.clone()))
    }

    async fn validate(&mut self, statement: &String) -> Result<Verdict<ExecutionPayload, String>> {
        match self.controller.store.execute(statement).await {
            Ok(payload) => Ok(Verdict::Accept(payload)),
            Err(StoreError::Statement(message)) => {
                warn!("Error executing query: {}", message);
                self.state.last_error = Some(message.clone());
                Ok(Verdict::Reject(message))
            }
            Err(StoreError::Connection(message)) => Err(NlqError::Database(message)),
            Err(StoreError::Decode(message)) => {
                error!("Statement ran but its result could not be read: {}", message);
                Err(NlqError::Database(message))
            }
        }
    }

    async fn augment(&mut self, statement: Option<&String>, error: &String) -> Result<()> {
        let statement = statement.cloned().unwrap_or_else(|| self.state.statement.clone());
        let request = CorrectionRequest {
            statement: statement.clone(),
            intent: self.intent.to_string(),
            error: error.clone(),
        };
        let correlation_id = Uuid::new_v4().simple().to_string();
        info!("Requesting correction (correlation id {})", correlation_id);

        let unavailable = |reason: String| NlqError::CorrectionUnavailable {
            statement: statement.clone(),
            error: error.clone(),
            reason,
        };

        let replacement = match self
            .controller
            .corrector
            .correct(&request, &correlation_id)
            .await
        {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            Ok(_) => {
                error!("Correction service did not return a corrected SQL query.");
                return Err(unavailable("no replacement statement returned".to_string()));
            }
            Err(e) => {
                error!("Error invoking correction service: {}", e);
                return Err(unavailable(e.to_string()));
            }
        };

        info!("Correction service provided SQL query: {}", replacement);
        self.state.statement = replacement.trim().to_string();
        Ok(())
    }
}

const CORRECTION_INSTRUCTIONS: &str = "\
You fix SQL statements that failed to execute against a PostgreSQL database.
You are given the failing statement, the user's question it was meant to answer and the error message.
Return only the complete corrected statement inside <SQL></SQL> tags.
If the statement cannot be corrected, return empty <SQL></SQL> tags.";

/// Correction service backed by a text generator.
pub struct LlmCorrectionService {
    generator: Arc<dyn Generator>,
    sampling: SamplingParams,
}

impl LlmCorrectionService {
    pub fn new(generator: Arc<dyn Generator>, sampling: SamplingParams) -> Self {
        Self {
            generator,
            sampling,
        }
    }
}

#[async_trait]
impl CorrectionService for LlmCorrectionService {
    async fn correct(
        &self,
        request: &CorrectionRequest,
        correlation_id: &str,
    ) -> Result<Option<String>> {
        let payload = serde_json::to_string(request)?;
        let generation = GenerationRequest::new(&[], payload)
            .with_system(Some(CORRECTION_INSTRUCTIONS.to_string()))
            .with_sampling(self.sampling);

        let response = self.generator.generate(&generation).await?;
        info!("Correction {} completion: {}", correlation_id, response);

        // Without tags the whole completion is taken as the statement.
        let statement = match crate::extract::extract(&response) {
            Ok(candidate) => candidate.into_inner(),
            Err(_) => response.trim().to_string(),
        };
        Ok(Some(statement).filter(|s| !s.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedGenerator(String);

    #[async_trait]
    impl Generator for FixedGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct RecordingGenerator(Mutex<Vec<GenerationRequest>>);

    #[async_trait]
    impl Generator for RecordingGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            self.0.lock().unwrap().push(request.clone());
            Ok("<SQL>select 1</SQL>".to_string())
        }
    }

    fn request() -> CorrectionRequest {
        CorrectionRequest {
            statement: "selec 1".to_string(),
            intent: "one".to_string(),
            error: "syntax error at or near \"selec\"".to_string(),
        }
    }

    #[tokio::test]
    async fn test_llm_correction_extracts_tagged_statement() {
        let service = LlmCorrectionService::new(
            Arc::new(FixedGenerator("Here: <SQL> SELECT 1 </SQL>".to_string())),
            SamplingParams::default(),
        );
        let fixed = service.correct(&request(), "abc").await.unwrap();
        assert_eq!(fixed.as_deref(), Some("SELECT 1"));
    }

    #[tokio::test]
    async fn test_llm_correction_empty_is_none() {
        let service = LlmCorrectionService::new(
            Arc::new(FixedGenerator("<SQL></SQL>".to_string())),
            SamplingParams::default(),
        );
        assert_eq!(service.correct(&request(), "abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_llm_correction_sends_labelled_payload() {
        let generator = Arc::new(RecordingGenerator(Mutex::new(Vec::new())));
        let service = LlmCorrectionService::new(generator.clone(), SamplingParams::default());
        service.correct(&request(), "abc").await.unwrap();

        let sent = generator.0.lock().unwrap();
        let payload: serde_json::Value = serde_json::from_str(sent[0].prompt()).unwrap();
        assert_eq!(payload["SQL Statement"], "selec 1");
        assert_eq!(payload["User question"], "one");
        assert!(sent[0].system.as_deref().unwrap().contains("<SQL></SQL>"));
    }
}
