//! Process configuration, read once from the environment at startup.

use crate::error::{NlqError, Result};
use crate::execution::SubmitContext;
use crate::repair::DEFAULT_REPAIR_ATTEMPTS;
use crate::synthesis::DEFAULT_SYNTHESIS_ATTEMPTS;
use crate::validator::DEFAULT_POLL_INTERVAL;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub coordinator_url: String,
    pub user: String,
    pub submit: SubmitContext,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub engine: EngineConfig,
    /// Enables the statement store and persistent history when set.
    pub database_url: Option<String>,
    pub synthesis_attempts: u32,
    pub repair_attempts: u32,
}

fn parsed<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| NlqError::Config(format!("invalid {}: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

fn budget(key: &str, default: u32) -> Result<u32> {
    let value = parsed(key, default)?;
    if value == 0 {
        return Err(NlqError::Config(format!("{} must be at least 1", key)));
    }
    Ok(value)
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let poll_ms = parsed("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL.as_millis() as u64)?;
        Ok(Self {
            coordinator_url: std::env::var("TRINO_COORDINATOR_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            user: std::env::var("TRINO_USER").unwrap_or_else(|_| "admin".to_string()),
            submit: SubmitContext::from_env(),
            poll_interval: Duration::from_millis(poll_ms),
        })
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            engine: EngineConfig::from_env()?,
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            synthesis_attempts: budget("SYNTHESIS_MAX_ATTEMPTS", DEFAULT_SYNTHESIS_ATTEMPTS)?,
            repair_attempts: budget("REPAIR_MAX_ATTEMPTS", DEFAULT_REPAIR_ATTEMPTS)?,
        })
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| NlqError::Config("DATABASE_URL is not set".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable name; the process environment is shared.

    #[test]
    fn test_budget_defaults_when_unset() {
        assert_eq!(budget("NLQ_TEST_BUDGET_UNSET", 3).unwrap(), 3);
    }

    #[test]
    fn test_budget_rejects_zero_and_garbage() {
        std::env::set_var("NLQ_TEST_BUDGET_ZERO", "0");
        assert!(matches!(budget("NLQ_TEST_BUDGET_ZERO", 3), Err(NlqError::Config(_))));

        std::env::set_var("NLQ_TEST_BUDGET_TEXT", "three");
        assert!(matches!(budget("NLQ_TEST_BUDGET_TEXT", 3), Err(NlqError::Config(_))));

        std::env::set_var("NLQ_TEST_BUDGET_OK", " 7 ");
        assert_eq!(budget("NLQ_TEST_BUDGET_OK", 3).unwrap(), 7);
    }
}
