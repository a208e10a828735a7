//! Conversation history, keyed by session id. Written by the assistant glue
//! after a successful answer; the synthesis and repair loops never touch it.

use crate::error::Result;
use crate::llm::GenerationTurn;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append turns in order after everything already stored for the session.
    async fn append(&self, session_id: &str, turns: &[GenerationTurn]) -> Result<()>;

    /// All turns of the session, oldest first.
    async fn read(&self, session_id: &str) -> Result<Vec<GenerationTurn>>;
}

#[derive(Default)]
pub struct InMemoryHistory {
    sessions: Mutex<HashMap<String, Vec<GenerationTurn>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn append(&self, session_id: &str, turns: &[GenerationTurn]) -> Result<()> {
        self.sessions
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .extend_from_slice(turns);
        Ok(())
    }

    async fn read(&self, session_id: &str) -> Result<Vec<GenerationTurn>> {
        Ok(self
            .sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }
}
