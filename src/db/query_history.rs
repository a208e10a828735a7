//! Conversation history repository backed by PostgreSQL

use crate::error::{NlqError, Result};
use crate::history::HistoryStore;
use crate::llm::{GenerationTurn, Role};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::info;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_history (
    session_id TEXT NOT NULL,
    seq BIGINT NOT NULL,
    role TEXT NOT NULL,
    text TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (session_id, seq)
)
"#;

pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append(&self, session_id: &str, turns: &[GenerationTurn]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Sequence numbers keep turns written in the same instant distinct
        let next: i64 = sqlx::query(
            "SELECT COALESCE(MAX(seq) + 1, 0) AS next FROM conversation_history WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?
        .try_get("next")?;

        for (offset, turn) in turns.iter().enumerate() {
            sqlx::query(
                "INSERT INTO conversation_history (session_id, seq, role, text) VALUES ($1, $2, $3, $4)",
            )
            .bind(session_id)
            .bind(next + offset as i64)
            .bind(role_name(turn.role))
            .bind(&turn.text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("{} turns written for session {}", turns.len(), session_id);
        Ok(())
    }

    async fn read(&self, session_id: &str) -> Result<Vec<GenerationTurn>> {
        let rows = sqlx::query(
            "SELECT role, text FROM conversation_history WHERE session_id = $1 ORDER BY seq",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let role: String = row.try_get("role")?;
                let text: String = row.try_get("text")?;
                let role = match role.as_str() {
                    "user" => Role::User,
                    "assistant" => Role::Assistant,
                    other => {
                        return Err(NlqError::Database(format!(
                            "unknown role '{}' in history for session {}",
                            other, session_id
                        )))
                    }
                };
                Ok(GenerationTurn { role, text })
            })
            .collect()
    }
}
