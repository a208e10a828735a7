//! Database module for PostgreSQL connection and operations
//!
//! Statement execution for the repair loop and conversation history storage.

pub mod connection;
pub mod query_history;
pub mod store;

pub use connection::init_pool;
pub use query_history::PgHistoryStore;
pub use store::{ExecutionPayload, PgStatementStore, StatementStore, StoreError};
