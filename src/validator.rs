//! Execution Validator
//!
//! Validates a candidate by running it. Submission returns a handle, status is
//! polled on a fixed interval until it leaves {queued, running}, and the
//! terminal state becomes a `ValidationOutcome`.
//!
//! There is no deadline here: an engine that never reaches a terminal state
//! keeps `validate` waiting forever. Callers that need a bound wrap the future
//! in `tokio::time::timeout`; dropping it stops the polling.

use crate::error::Result;
use crate::execution::{ExecutionStatus, QueryEngine, ResultSet, SubmitContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Wait between two status polls.
#[async_trait]
pub trait PollWait: Send + Sync {
    async fn wait(&self);
}

pub struct FixedIntervalWait {
    interval: Duration,
}

impl FixedIntervalWait {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedIntervalWait {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

#[async_trait]
impl PollWait for FixedIntervalWait {
    async fn wait(&self) {
        tokio::time::sleep(self.interval).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Passed { rows: Vec<Vec<String>> },
    Failed { message: String },
}

/// Terminal result of one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineRun {
    Completed(ResultSet),
    Failed(String),
}

pub struct ExecutionValidator {
    engine: Arc<dyn QueryEngine>,
    waiter: Arc<dyn PollWait>,
    context: SubmitContext,
}

impl ExecutionValidator {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        waiter: Arc<dyn PollWait>,
        context: SubmitContext,
    ) -> Self {
        Self {
            engine,
            waiter,
            context,
        }
    }

    pub fn context(&self) -> &SubmitContext {
        &self.context
    }

    /// Run a statement to a terminal state. Transport errors are returned as
    /// `Err` and never retried here.
    pub async fn run(&self, sql: &str) -> Result<EngineRun> {
        let handle = self.engine.submit(sql, &self.context).await?;
        info!("{} query execution ID: {}", self.engine.name(), handle);

        let mut polls: u32 = 0;
        loop {
            let status = self.engine.poll(&handle).await?;
            match status {
                ExecutionStatus::Queued | ExecutionStatus::Running => {
                    polls += 1;
                    debug!("Query {} is still {} (poll {})", handle, status, polls);
                    self.waiter.wait().await;
                }
                ExecutionStatus::Succeeded => {
                    info!("Query {} finished with state: {}", handle, status);
                    let results = self.engine.fetch(&handle).await?;
                    debug!("Fetched {} rows for query {}", results.row_count(), handle);
                    return Ok(EngineRun::Completed(results));
                }
                ExecutionStatus::Failed { reason } | ExecutionStatus::Cancelled { reason } => {
                    warn!("Query {} did not succeed: {}", handle, reason);
                    return Ok(EngineRun::Failed(reason));
                }
            }
        }
    }

    /// Rows are returned header first, each cell in the engine's own rendering.
    pub async fn validate(&self, candidate: &str) -> Result<ValidationOutcome> {
        Ok(match self.run(candidate).await? {
            EngineRun::Completed(results) => ValidationOutcome::Passed {
                rows: results.into_rows_with_header(),
            },
            EngineRun::Failed(message) => ValidationOutcome::Failed { message },
        })
    }
}
