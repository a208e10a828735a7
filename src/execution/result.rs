//! Query Result - string-rendered rows as produced by an execution engine

use serde::{Deserialize, Serialize};

/// Column names plus rows of the engine's own string rendering of each cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Header row followed by the data rows, matching result sets whose first
    /// row carries the column labels.
    pub fn into_rows_with_header(self) -> Vec<Vec<String>> {
        let mut out = Vec::with_capacity(self.rows.len() + 1);
        if !self.columns.is_empty() {
            out.push(self.columns);
        }
        out.extend(self.rows);
        out
    }
}
