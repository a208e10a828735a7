//! Trino Execution Engine
//!
//! Submits statements over the Trino REST protocol and advances them one
//! `nextUri` page per poll. Pages are buffered per query id until `fetch`.

use crate::error::{NlqError, Result};
use crate::execution::engine::{ExecutionHandle, ExecutionStatus, QueryEngine, SubmitContext};
use crate::execution::result::ResultSet;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Trino execution engine
pub struct TrinoEngine {
    coordinator_url: String,
    client: Client,
    user: String,
    pending: Mutex<HashMap<String, PendingQuery>>,
}

// Trino REST API: POST /v1/statement with SQL in body (plain text, not JSON)
// Headers: X-Trino-User, X-Trino-Catalog, X-Trino-Schema

#[derive(Debug, Deserialize)]
struct TrinoPage {
    id: String,
    #[serde(rename = "nextUri")]
    next_uri: Option<String>,
    columns: Option<Vec<TrinoColumn>>,
    data: Option<Vec<Vec<serde_json::Value>>>,
    stats: Option<TrinoStats>,
    error: Option<TrinoError>,
}

#[derive(Debug, Deserialize)]
struct TrinoStats {
    state: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TrinoError {
    message: String,
    #[serde(rename = "errorName")]
    error_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrinoColumn {
    name: String,
}

/// Client-side state of one submitted statement.
#[derive(Debug, Default)]
struct PendingQuery {
    next_uri: Option<String>,
    state: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    error: Option<TrinoError>,
}

impl PendingQuery {
    fn absorb(&mut self, page: TrinoPage) {
        if self.columns.is_empty() {
            if let Some(cols) = page.columns {
                self.columns = cols.into_iter().map(|c| c.name).collect();
            }
        }
        if let Some(data) = page.data {
            self.rows
                .extend(data.iter().map(|row| row.iter().map(render_cell).collect()));
        }
        if let Some(stats) = page.stats {
            self.state = stats.state;
        }
        self.next_uri = page.next_uri;
        if page.error.is_some() {
            self.error = page.error;
        }
    }

    fn status(&self) -> ExecutionStatus {
        if let Some(error) = &self.error {
            return match error.error_name.as_deref() {
                Some("USER_CANCELED") | Some("ADMINISTRATIVELY_KILLED") => {
                    ExecutionStatus::Cancelled {
                        reason: error.message.clone(),
                    }
                }
                _ => ExecutionStatus::Failed {
                    reason: error.message.clone(),
                },
            };
        }
        if self.next_uri.is_none() {
            return match self.state.as_str() {
                "FAILED" => ExecutionStatus::Failed {
                    reason: "query failed without an error message".to_string(),
                },
                _ => ExecutionStatus::Succeeded,
            };
        }
        match self.state.as_str() {
            "QUEUED" | "WAITING_FOR_RESOURCES" | "DISPATCHING" => ExecutionStatus::Queued,
            _ => ExecutionStatus::Running,
        }
    }
}

/// Trino's own text rendering: strings as-is, null as empty, the rest as JSON.
fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl TrinoEngine {
    /// Create a new Trino engine
    ///
    /// # Arguments
    /// * `coordinator_url` - Trino coordinator URL (e.g., "http://localhost:8080")
    /// * `user` - Trino user name
    pub fn new(coordinator_url: String, user: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| NlqError::Engine(format!("Failed to create HTTP client for Trino: {}", e)))?;

        Ok(Self {
            coordinator_url: coordinator_url.trim_end_matches('/').to_string(),
            client,
            user,
            pending: Mutex::new(HashMap::new()),
        })
    }

    fn absolute(&self, uri: &str) -> String {
        if uri.starts_with("http") {
            uri.to_string()
        } else {
            format!("{}{}", self.coordinator_url, uri)
        }
    }

    fn pending(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, PendingQuery>>> {
        self.pending
            .lock()
            .map_err(|_| NlqError::Engine("Trino query table lock poisoned".to_string()))
    }

    async fn next_page(&self, uri: &str) -> Result<TrinoPage> {
        let response = self
            .client
            .get(self.absolute(uri))
            .header("X-Trino-User", &self.user)
            .send()
            .await
            .map_err(|e| NlqError::Engine(format!("Failed to poll Trino query: {}", e)))?;
        self.read_page(response).await
    }

    /// Failed and cancelled queries have nothing left to fetch, so their
    /// buffers are dropped as soon as the terminal state is seen.
    fn settle(
        pending: &mut HashMap<String, PendingQuery>,
        handle: &ExecutionHandle,
        status: ExecutionStatus,
    ) -> ExecutionStatus {
        if matches!(
            status,
            ExecutionStatus::Failed { .. } | ExecutionStatus::Cancelled { .. }
        ) {
            pending.remove(&handle.0);
        }
        status
    }

    async fn read_page(&self, response: reqwest::Response) -> Result<TrinoPage> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NlqError::Engine(format!(
                "Trino request failed with status {}: {}",
                status, text
            )));
        }
        response
            .json()
            .await
            .map_err(|e| NlqError::Engine(format!("Failed to parse Trino response: {}", e)))
    }
}

#[async_trait]
impl QueryEngine for TrinoEngine {
    fn name(&self) -> &'static str {
        "trino"
    }

    async fn submit(&self, sql: &str, ctx: &SubmitContext) -> Result<ExecutionHandle> {
        let url = format!("{}/v1/statement", self.coordinator_url);

        let mut request = self
            .client
            .post(&url)
            .header("X-Trino-User", &self.user)
            .header("X-Trino-Catalog", &ctx.catalog)
            .header("X-Trino-Schema", &ctx.database)
            .header("Content-Type", "text/plain");
        // Resource groups select on client tags
        if let Some(workgroup) = &ctx.workgroup {
            request = request.header("X-Trino-Client-Tags", workgroup);
        }
        if let Some(location) = &ctx.output_location {
            debug!("Trino returns results inline; output location {} unused", location);
        }

        let response = request
            .body(sql.to_string())
            .send()
            .await
            .map_err(|e| NlqError::Engine(format!("Failed to submit Trino query: {}", e)))?;
        let page = self.read_page(response).await?;

        let handle = ExecutionHandle(page.id.clone());
        info!("Trino query submitted: {}", handle);

        let mut query = PendingQuery::default();
        query.absorb(page);
        self.pending()?.insert(handle.0.clone(), query);
        Ok(handle)
    }

    async fn poll(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus> {
        let next_uri = {
            let mut pending = self.pending()?;
            let query = pending
                .get(&handle.0)
                .ok_or_else(|| NlqError::Engine(format!("Unknown Trino query: {}", handle)))?;
            let status = query.status();
            if !status.is_in_flight() {
                return Ok(Self::settle(&mut pending, handle, status));
            }
            query.next_uri.clone()
        };

        let Some(uri) = next_uri else {
            return Ok(ExecutionStatus::Succeeded);
        };

        let page = match self.next_page(&uri).await {
            Ok(page) => page,
            Err(e) => {
                // Nobody will fetch a query whose poll failed.
                self.pending()?.remove(&handle.0);
                return Err(e);
            }
        };

        let mut pending = self.pending()?;
        let query = pending
            .get_mut(&handle.0)
            .ok_or_else(|| NlqError::Engine(format!("Unknown Trino query: {}", handle)))?;
        query.absorb(page);
        let status = query.status();
        Ok(Self::settle(&mut pending, handle, status))
    }

    async fn fetch(&self, handle: &ExecutionHandle) -> Result<ResultSet> {
        let mut pending = self.pending()?;
        let status = pending
            .get(&handle.0)
            .map(PendingQuery::status)
            .ok_or_else(|| NlqError::Engine(format!("Unknown Trino query: {}", handle)))?;
        if status != ExecutionStatus::Succeeded {
            return Err(NlqError::Engine(format!(
                "Cannot fetch Trino query {} in state {}",
                handle, status
            )));
        }

        let query = pending
            .remove(&handle.0)
            .ok_or_else(|| NlqError::Engine(format!("Unknown Trino query: {}", handle)))?;
        debug!("Trino query {} returned {} rows", handle, query.rows.len());
        Ok(ResultSet::new(query.columns, query.rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(json: &str) -> TrinoPage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_queued_then_running_then_finished() {
        let mut query = PendingQuery::default();
        query.absorb(page(
            r#"{"id":"q1","nextUri":"/v1/statement/queued/q1/1","stats":{"state":"QUEUED"}}"#,
        ));
        assert_eq!(query.status(), ExecutionStatus::Queued);

        query.absorb(page(
            r#"{"id":"q1","nextUri":"/v1/statement/executing/q1/2","stats":{"state":"RUNNING"},
               "columns":[{"name":"total","type":"decimal(10,2)"},{"name":"name","type":"varchar"}],
               "data":[["9855.00","march"],[null,"april"]]}"#,
        ));
        assert_eq!(query.status(), ExecutionStatus::Running);

        query.absorb(page(r#"{"id":"q1","stats":{"state":"FINISHED"},"data":[[12,true]]}"#));
        assert_eq!(query.status(), ExecutionStatus::Succeeded);
        assert_eq!(query.columns, vec!["total", "name"]);
        assert_eq!(
            query.rows,
            vec![
                vec!["9855.00".to_string(), "march".to_string()],
                vec!["".to_string(), "april".to_string()],
                vec!["12".to_string(), "true".to_string()],
            ]
        );
    }

    #[test]
    fn test_failure_reason_is_verbatim() {
        let mut query = PendingQuery::default();
        query.absorb(page(
            r#"{"id":"q2","stats":{"state":"FAILED"},
               "error":{"message":"line 1:8: Column 'amount' cannot be resolved","errorCode":47,"errorName":"COLUMN_NOT_FOUND"}}"#,
        ));
        assert_eq!(
            query.status(),
            ExecutionStatus::Failed {
                reason: "line 1:8: Column 'amount' cannot be resolved".to_string()
            }
        );
    }

    #[test]
    fn test_cancelled() {
        let mut query = PendingQuery::default();
        query.absorb(page(
            r#"{"id":"q3","stats":{"state":"FAILED"},"error":{"message":"Query was canceled","errorName":"USER_CANCELED"}}"#,
        ));
        assert!(matches!(query.status(), ExecutionStatus::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_fetch_requires_success() {
        let engine = TrinoEngine::new("http://localhost:8080/".to_string(), "admin".to_string()).unwrap();
        let mut query = PendingQuery::default();
        query.absorb(page(
            r#"{"id":"q4","nextUri":"/v1/statement/queued/q4/1","stats":{"state":"QUEUED"}}"#,
        ));
        engine.pending().unwrap().insert("q4".to_string(), query);

        let handle = ExecutionHandle("q4".to_string());
        assert!(matches!(engine.fetch(&handle).await, Err(NlqError::Engine(_))));
        assert_eq!(engine.absolute("/v1/x"), "http://localhost:8080/v1/x");
    }

    #[tokio::test]
    async fn test_failed_queries_are_released() {
        let engine = TrinoEngine::new("http://localhost:8080".to_string(), "admin".to_string()).unwrap();
        for id in ["f1", "f2", "f3"] {
            let mut query = PendingQuery::default();
            query.absorb(page(&format!(
                r#"{{"id":"{}","stats":{{"state":"FAILED"}},"error":{{"message":"boom","errorName":"SYNTAX_ERROR"}}}}"#,
                id
            )));
            engine.pending().unwrap().insert(id.to_string(), query);

            let status = engine.poll(&ExecutionHandle(id.to_string())).await.unwrap();
            assert!(matches!(status, ExecutionStatus::Failed { .. }));
        }
        assert!(engine.pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poll_transport_error_releases_query() {
        // Nothing listens on port 1.
        let engine = TrinoEngine::new("http://127.0.0.1:1".to_string(), "admin".to_string()).unwrap();
        let mut query = PendingQuery::default();
        query.absorb(page(
            r#"{"id":"q5","nextUri":"/v1/statement/executing/q5/1","stats":{"state":"RUNNING"}}"#,
        ));
        engine.pending().unwrap().insert("q5".to_string(), query);

        let result = engine.poll(&ExecutionHandle("q5".to_string())).await;
        assert!(matches!(result, Err(NlqError::Engine(_))));
        assert!(engine.pending().unwrap().is_empty());
    }
}
