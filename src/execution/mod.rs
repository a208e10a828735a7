//! Execution Module - asynchronous query engines used for validation
//!
//! - QueryEngine trait: submit / poll / fetch
//! - ResultSet: string-rendered rows
//! - TrinoEngine: REST implementation

pub mod engine;
pub mod result;

// Engine implementations
pub mod trino_engine;

pub use engine::{ExecutionHandle, ExecutionStatus, QueryEngine, SubmitContext};
pub use result::ResultSet;
pub use trino_engine::TrinoEngine;
