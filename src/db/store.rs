//! Statement store: runs SQL directly against the relational store and shapes
//! the result into store-independent JSON values.
//!
//! Statements go over the simple query protocol, so every cell arrives in the
//! server's text form. Known scalar types are decoded from that text; anything
//! else (enums, arrays, intervals, ranges, bytea, network types) keeps the
//! server's rendering as a string. NUMERIC is never parsed, which keeps
//! arbitrary precision exact.

use crate::execution_loop::{ErrorClass, ErrorClassifier};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{Column, Executor, PgPool, Row, TypeInfo};
use thiserror::Error;
use tracing::{debug, info};

/// One result row keyed by column name, in store column order.
pub type RowMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionPayload {
    Rows(Vec<RowMap>),
    Acknowledged { message: String, rows_affected: u64 },
}

impl ExecutionPayload {
    pub fn acknowledged(rows_affected: u64) -> Self {
        ExecutionPayload::Acknowledged {
            message: "Query executed successfully".to_string(),
            rows_affected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The statement itself is at fault; a corrected statement may succeed.
    #[error("{0}")]
    Statement(String),

    /// The store could not be reached or aborted the work.
    #[error("{0}")]
    Connection(String),

    /// The statement ran but its result could not be read back.
    #[error("{0}")]
    Decode(String),
}

#[async_trait]
pub trait StatementStore: Send + Sync {
    async fn execute(&self, sql: &str) -> std::result::Result<ExecutionPayload, StoreError>;
}

fn leading_keyword(sql: &str) -> String {
    sql.trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .find(|w| !w.is_empty())
        .unwrap_or_default()
        .to_ascii_uppercase()
}

/// INSERT/UPDATE/DELETE by leading keyword, case-insensitive.
pub fn is_mutating(sql: &str) -> bool {
    matches!(leading_keyword(sql).as_str(), "INSERT" | "UPDATE" | "DELETE")
}

pub fn returns_rows(sql: &str) -> bool {
    matches!(
        leading_keyword(sql).as_str(),
        "SELECT" | "WITH" | "VALUES" | "TABLE" | "SHOW" | "EXPLAIN"
    )
}

/// A decoded cell before it leaves the store layer.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact decimal text as the server rendered it
    Numeric(String),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Time(NaiveTime),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
}

impl NativeValue {
    /// Exact decimal strings for numerics, ISO-8601 for dates and times.
    pub fn render(self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            NativeValue::Null => Value::Null,
            NativeValue::Bool(b) => Value::Bool(b),
            NativeValue::Int(i) => Value::from(i),
            NativeValue::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(f.to_string())),
            NativeValue::Numeric(n) => Value::String(n),
            NativeValue::Text(s) => Value::String(s),
            NativeValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            NativeValue::Timestamp(ts) => {
                Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            NativeValue::TimestampTz(ts) => {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, false))
            }
            NativeValue::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
            NativeValue::Uuid(u) => Value::String(u.to_string()),
            NativeValue::Json(v) => v,
        }
    }
}

fn cell<T, F>(
    row: &PgRow,
    idx: usize,
    wrap: F,
) -> std::result::Result<NativeValue, sqlx::Error>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    F: FnOnce(T) -> NativeValue,
{
    Ok(row
        .try_get::<Option<T>, _>(idx)?
        .map(wrap)
        .unwrap_or(NativeValue::Null))
}

/// The cell's text form, whatever its declared type.
fn text_cell(
    row: &PgRow,
    idx: usize,
    wrap: fn(String) -> NativeValue,
) -> std::result::Result<NativeValue, sqlx::Error> {
    Ok(row
        .try_get_unchecked::<Option<String>, _>(idx)?
        .map(wrap)
        .unwrap_or(NativeValue::Null))
}

fn decode_cell(row: &PgRow, idx: usize, type_name: &str) -> std::result::Result<NativeValue, sqlx::Error> {
    let typed = match type_name {
        "BOOL" => cell::<bool, _>(row, idx, NativeValue::Bool),
        "INT2" => cell::<i16, _>(row, idx, |v| NativeValue::Int(v.into())),
        "INT4" => cell::<i32, _>(row, idx, |v| NativeValue::Int(v.into())),
        "INT8" => cell::<i64, _>(row, idx, NativeValue::Int),
        "FLOAT4" => cell::<f32, _>(row, idx, |v| NativeValue::Float(v.into())),
        "FLOAT8" => cell::<f64, _>(row, idx, NativeValue::Float),
        "NUMERIC" => return text_cell(row, idx, NativeValue::Numeric),
        "DATE" => cell::<NaiveDate, _>(row, idx, NativeValue::Date),
        "TIMESTAMP" => cell::<NaiveDateTime, _>(row, idx, NativeValue::Timestamp),
        "TIMESTAMPTZ" => cell::<DateTime<Utc>, _>(row, idx, NativeValue::TimestampTz),
        "TIME" => cell::<NaiveTime, _>(row, idx, NativeValue::Time),
        "UUID" => cell::<uuid::Uuid, _>(row, idx, NativeValue::Uuid),
        "JSON" | "JSONB" => cell::<serde_json::Value, _>(row, idx, NativeValue::Json),
        _ => return text_cell(row, idx, NativeValue::Text),
    };

    // Values outside the typed decoders' range (infinity dates, for one) and
    // types without a decoder keep the server's text.
    typed.or_else(|_| text_cell(row, idx, NativeValue::Text))
}

pub fn shape_row(row: &PgRow) -> std::result::Result<RowMap, sqlx::Error> {
    let mut out = RowMap::new();
    for column in row.columns() {
        let value = decode_cell(row, column.ordinal(), column.type_info().name())?;
        out.insert(column.name().to_string(), value.render());
    }
    Ok(out)
}

pub struct PgStatementStore {
    pool: PgPool,
    classifier: ErrorClassifier,
}

impl PgStatementStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            classifier: ErrorClassifier::new(),
        }
    }

    fn store_error(&self, error: sqlx::Error) -> StoreError {
        match self.classifier.classify(&error) {
            ErrorClass::Statement => StoreError::Statement(error.to_string()),
            ErrorClass::Transient => StoreError::Connection(error.to_string()),
            ErrorClass::Decode => StoreError::Decode(error.to_string()),
        }
    }
}

#[async_trait]
impl StatementStore for PgStatementStore {
    async fn execute(&self, sql: &str) -> std::result::Result<ExecutionPayload, StoreError> {
        info!("Executing SQL query: {}", sql);

        if is_mutating(sql) {
            let mut tx = self.pool.begin().await.map_err(|e| self.store_error(e))?;
            let done = (&mut *tx)
                .execute(sqlx::raw_sql(sql))
                .await
                .map_err(|e| self.store_error(e))?;
            tx.commit().await.map_err(|e| self.store_error(e))?;
            debug!("Committed {} affected rows", done.rows_affected());
            return Ok(ExecutionPayload::acknowledged(done.rows_affected()));
        }

        if returns_rows(sql) {
            let rows = (&self.pool)
                .fetch_all(sqlx::raw_sql(sql))
                .await
                .map_err(|e| self.store_error(e))?;
            let shaped = rows
                .iter()
                .map(shape_row)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| self.store_error(e))?;
            debug!("SQL result: {} rows", shaped.len());
            return Ok(ExecutionPayload::Rows(shaped));
        }

        let done = (&self.pool)
            .execute(sqlx::raw_sql(sql))
            .await
            .map_err(|e| self.store_error(e))?;
        Ok(ExecutionPayload::acknowledged(done.rows_affected()))
    }
}
