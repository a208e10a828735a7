//! Catalog snapshots handed to the synthesis loop.

use crate::error::{NlqError, Result};
use crate::validator::{EngineRun, ExecutionValidator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: String,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
        }
    }
}

/// Table name to ordered columns. Tables are kept sorted so prompts built from
/// the same snapshot are byte-identical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaSnapshot {
    tables: BTreeMap<String, Vec<ColumnDescriptor>>,
}

impl SchemaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        self.tables.insert(table.into(), columns);
        self
    }

    /// Append a column, creating the table entry on first sight.
    pub fn push_column(&mut self, table: &str, column: ColumnDescriptor) {
        self.tables.entry(table.to_string()).or_default().push(column);
    }

    pub fn columns(&self, table: &str) -> Option<&[ColumnDescriptor]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }
}

impl fmt::Display for SchemaSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (table, columns) in &self.tables {
            let cols: Vec<String> = columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.declared_type))
                .collect();
            writeln!(f, "{} ({})", table, cols.join(", "))?;
        }
        Ok(())
    }
}

/// Supplies a fresh snapshot between top-level invocations.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn snapshot(&self) -> Result<SchemaSnapshot>;
}

/// Snapshot read from a JSON file shaped `{"table": [{"name": .., "type": ..}]}`.
pub struct StaticSchemaProvider {
    path: PathBuf,
}

impl StaticSchemaProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl SchemaProvider for StaticSchemaProvider {
    async fn snapshot(&self) -> Result<SchemaSnapshot> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let snapshot: SchemaSnapshot = serde_json::from_str(&raw)?;
        if snapshot.is_empty() {
            return Err(NlqError::Config(format!(
                "schema file {} declares no tables",
                self.path.display()
            )));
        }
        Ok(snapshot)
    }
}

/// Snapshot read from the engine's own `information_schema.columns` for the
/// configured database.
pub struct EngineSchemaProvider {
    validator: Arc<ExecutionValidator>,
}

impl EngineSchemaProvider {
    pub fn new(validator: Arc<ExecutionValidator>) -> Self {
        Self { validator }
    }

    fn catalog_query(&self) -> String {
        let database = self.validator.context().database.replace('\'', "''");
        format!(
            "SELECT table_name, column_name, data_type FROM information_schema.columns \
             WHERE table_schema = '{}' ORDER BY table_name, ordinal_position",
            database
        )
    }
}

#[async_trait]
impl SchemaProvider for EngineSchemaProvider {
    async fn snapshot(&self) -> Result<SchemaSnapshot> {
        let results = match self.validator.run(&self.catalog_query()).await? {
            EngineRun::Completed(results) => results,
            EngineRun::Failed(reason) => {
                return Err(NlqError::Engine(format!("Metadata retrieval failed: {}", reason)))
            }
        };

        let mut snapshot = SchemaSnapshot::new();
        for row in &results.rows {
            match row.as_slice() {
                [table, column, declared_type, ..] => {
                    snapshot.push_column(table, ColumnDescriptor::new(column, declared_type))
                }
                _ => {
                    return Err(NlqError::Engine(format!(
                        "Unexpected catalog row with {} cells",
                        row.len()
                    )))
                }
            }
        }
        info!("Metadata retrieved: {} tables", snapshot.len());
        Ok(snapshot)
    }
}
