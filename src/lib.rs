//! Natural-language to SQL synthesis with execution-checked self-correction,
//! plus a repair loop for statements that fail against the relational store.

pub mod assistant;
pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod execution_loop;
pub mod extract;
pub mod history;
pub mod llm;
pub mod prompt;
pub mod repair;
pub mod schema;
pub mod synthesis;
pub mod validator;

pub use assistant::{Answer, Assistant};
pub use error::{NlqError, Result};
pub use repair::{ExecutionRepairController, RepairResult};
pub use synthesis::{SynthesisController, SynthesisResult};
