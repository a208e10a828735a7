//! Execution Engine Trait - Core contract for asynchronous query engines
//!
//! Engines accept a statement, hand back a handle, and report progress through
//! polling. Retry policy never lives here.

use crate::error::Result;
use crate::execution::result::ResultSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where and under which context a statement runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitContext {
    /// Result output location, for engines that write results out of band
    pub output_location: Option<String>,

    pub catalog: String,

    pub database: String,

    /// Workgroup / resource group the statement is charged to
    pub workgroup: Option<String>,
}

impl SubmitContext {
    pub fn from_env() -> Self {
        Self {
            output_location: std::env::var("QUERY_OUTPUT_LOCATION").ok(),
            catalog: std::env::var("TRINO_CATALOG").unwrap_or_else(|_| "memory".to_string()),
            database: std::env::var("TRINO_SCHEMA").unwrap_or_else(|_| "default".to_string()),
            workgroup: std::env::var("QUERY_WORKGROUP").ok(),
        }
    }
}

/// Opaque id of a submitted statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionHandle(pub String);

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Queued,
    Running,
    Succeeded,
    Failed { reason: String },
    Cancelled { reason: String },
}

impl ExecutionStatus {
    /// Queued and running are the only non-terminal states.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ExecutionStatus::Queued | ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Queued => write!(f, "QUEUED"),
            ExecutionStatus::Running => write!(f, "RUNNING"),
            ExecutionStatus::Succeeded => write!(f, "SUCCEEDED"),
            ExecutionStatus::Failed { .. } => write!(f, "FAILED"),
            ExecutionStatus::Cancelled { .. } => write!(f, "CANCELLED"),
        }
    }
}

/// Asynchronous execution engine. Errors returned from these methods are
/// transport failures, not statement failures; statement failures surface as
/// `ExecutionStatus::Failed`.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Engine name (e.g., "trino")
    fn name(&self) -> &'static str;

    async fn submit(&self, sql: &str, ctx: &SubmitContext) -> Result<ExecutionHandle>;

    async fn poll(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus>;

    /// Rows of a succeeded execution. Only valid after `poll` reported success.
    async fn fetch(&self, handle: &ExecutionHandle) -> Result<ResultSet>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_set() {
        assert!(ExecutionStatus::Queued.is_in_flight());
        assert!(ExecutionStatus::Running.is_in_flight());
        assert!(!ExecutionStatus::Succeeded.is_in_flight());
        assert!(!ExecutionStatus::Failed { reason: "x".into() }.is_in_flight());
        assert!(!ExecutionStatus::Cancelled { reason: "x".into() }.is_in_flight());
    }
}
