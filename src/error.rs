use thiserror::Error;

#[derive(Error, Debug)]
pub enum NlqError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Question must not be empty")]
    EmptyQuestion,

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Malformed generator response: {0}")]
    MalformedResponse(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Both fields describe the final attempt. `last_candidate` is `None` when
    /// that attempt produced no query.
    #[error("SQL generation failed after {attempts} attempts; last error: {last_error}")]
    SynthesisExhausted {
        last_candidate: Option<String>,
        last_error: String,
        attempts: u32,
    },

    #[error("Correction unavailable for statement `{statement}`: {reason}")]
    CorrectionUnavailable {
        statement: String,
        error: String,
        reason: String,
    },

    #[error("Statement still failing after {attempts} attempts: {error}")]
    RepairExhausted {
        statement: String,
        error: String,
        attempts: u32,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for NlqError {
    fn from(err: sqlx::Error) -> Self {
        NlqError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NlqError>;
