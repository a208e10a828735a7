//! Synthesis Controller
//!
//! Drafting -> Validating -> {Accepted | Augmenting -> Drafting} | Exhausted.
//! Each call owns its failure notes; nothing is shared between calls beyond the
//! collaborators passed in at construction.

use crate::error::{NlqError, Result};
use crate::execution_loop::{run_bounded, FeedbackLoop, LoopOutcome, Proposal, Verdict};
use crate::extract::{extract, Candidate};
use crate::llm::{GenerationRequest, GenerationTurn, Generator, SamplingParams, DEFAULT_SYSTEM_INSTRUCTION};
use crate::prompt::{default_examples, FailureNote, PromptAssembler, WorkedExample};
use crate::schema::SchemaSnapshot;
use crate::validator::{ExecutionValidator, ValidationOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const DEFAULT_SYNTHESIS_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub max_attempts: u32,
    pub sampling: SamplingParams,
    pub system_instruction: Option<String>,
    pub examples: Vec<WorkedExample>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_SYNTHESIS_ATTEMPTS,
            sampling: SamplingParams::default(),
            system_instruction: Some(DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            examples: default_examples(),
        }
    }
}

/// Accepted query and the rows it produced. Only built from a passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub accepted_query: String,
    pub rows: Vec<Vec<String>>,
    pub attempts: u32,
}

pub struct SynthesisController {
    generator: Arc<dyn Generator>,
    validator: Arc<ExecutionValidator>,
    config: SynthesisConfig,
}

impl SynthesisController {
    pub fn new(
        generator: Arc<dyn Generator>,
        validator: Arc<ExecutionValidator>,
        config: SynthesisConfig,
    ) -> Self {
        Self {
            generator,
            validator,
            config,
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// `prior_turns` are sent verbatim, oldest first, on every attempt.
    pub async fn synthesize(
        &self,
        question: &str,
        schema: &SchemaSnapshot,
        prior_turns: &[GenerationTurn],
    ) -> Result<SynthesisResult> {
        if question.trim().is_empty() {
            return Err(NlqError::EmptyQuestion);
        }

        let mut attempt = SynthesisAttempt {
            controller: self,
            question,
            schema,
            prior_turns,
            notes: Vec::new(),
        };

        match run_bounded(&mut attempt, self.config.max_attempts).await? {
            LoopOutcome::Accepted {
                value: rows,
                candidate,
                attempts,
            } => {
                info!("Syntax check passed on attempt {}", attempts);
                Ok(SynthesisResult {
                    accepted_query: candidate.into_inner(),
                    rows,
                    attempts,
                })
            }
            LoopOutcome::Exhausted {
                last_candidate,
                last_feedback,
                attempts,
            } => {
                error!("SQL generation failed after {} attempts", attempts);
                Err(NlqError::SynthesisExhausted {
                    last_candidate: last_candidate.map(Candidate::into_inner),
                    last_error: last_feedback
                        .as_ref()
                        .map(failure_message)
                        .unwrap_or_default(),
                    attempts,
                })
            }
        }
    }
}

/// Per-call state of the synthesis loop.
struct SynthesisAttempt<'a> {
    controller: &'a SynthesisController,
    question: &'a str,
    schema: &'a SchemaSnapshot,
    prior_turns: &'a [GenerationTurn],
    notes: Vec<FailureNote>,
}

impl SynthesisAttempt<'_> {
    fn request(&self) -> GenerationRequest {
        let prompt = PromptAssembler::build(
            self.question,
            self.schema,
            &self.controller.config.examples,
            &self.notes,
        );
        GenerationRequest::new(self.prior_turns, prompt)
            .with_system(self.controller.config.system_instruction.clone())
            .with_sampling(self.controller.config.sampling)
    }
}

#[async_trait]
impl<'a> FeedbackLoop for SynthesisAttempt<'a> {
    type Candidate = Candidate;
    type Accepted = Vec<Vec<String>>;
    type Feedback = NlqError;

    async fn propose(&mut self, attempt: u32) -> Result<Proposal<Candidate, NlqError>> {
        info!("Attempt {}: Generating SQL", attempt);
        let request = self.request();

        let response = match self.controller.generator.generate(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("SQL generation failed: {}", e);
                return Ok(Proposal::Unusable(e));
            }
        };

        match extract(&response) {
            Ok(candidate) => {
                info!("Generated Query #{}: {}", attempt, candidate);
                Ok(Proposal::Ready(candidate))
            }
            Err(e) => {
                warn!("Generator response had no SQL block: {}", e);
                Ok(Proposal::Unusable(e))
            }
        }
    }

    async fn validate(&mut self, candidate: &Candidate) -> Result<Verdict<Vec<Vec<String>>, NlqError>> {
        match self.controller.validator.validate(candidate.as_str()).await? {
            ValidationOutcome::Passed { rows } => Ok(Verdict::Accept(rows)),
            ValidationOutcome::Failed { message } => {
                Ok(Verdict::Reject(NlqError::ValidationFailed(message)))
            }
        }
    }

    async fn augment(&mut self, candidate: Option<&Candidate>, feedback: &NlqError) -> Result<()> {
        // Only engine verdicts are fed forward; generator faults carry nothing
        // the model can correct.
        if let (Some(candidate), NlqError::ValidationFailed(message)) = (candidate, feedback) {
            self.notes.push(FailureNote {
                candidate: candidate.as_str().to_string(),
                message: message.clone(),
            });
        }
        Ok(())
    }
}

/// Engine verdicts keep their verbatim text; other faults use their display.
fn failure_message(error: &NlqError) -> String {
    match error {
        NlqError::ValidationFailed(message) => message.clone(),
        other => other.to_string(),
    }
}
