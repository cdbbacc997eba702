use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AdapterError, Result};

/// Raw result handed back by a native client.
/// Only `command`, `row_count` and `rows` leave the executor; the column
/// list is native detail.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQueryResult {
    /// Command tag, e.g. "SELECT" or "INSERT"
    pub command: String,
    /// Rows affected or returned, as reported by the server
    pub row_count: u64,
    /// Column names in order
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RawQueryResult {
    pub fn new(command: impl Into<String>, row_count: u64, columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            command: command.into(),
            row_count,
            columns,
            rows,
        }
    }

    pub fn empty(command: impl Into<String>) -> Self {
        Self::new(command, 0, Vec::new(), Vec::new())
    }
}

/// A single row, mapping column name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    values: Map<String, Value>,
}

impl Row {
    /// Creates a Row from column names and values in column order.
    pub fn new(columns: &[String], values: Vec<Value>) -> Self {
        let values = columns
            .iter()
            .cloned()
            .zip(values)
            .collect();
        Self { values }
    }

    /// Gets a value by column name.
    pub fn get(&self, column: &str) -> Result<&Value> {
        self.values
            .get(column)
            .ok_or_else(|| AdapterError::ColumnNotFound(column.to_string()))
    }

    /// Gets a column as a string, `None` when the value is NULL or not text.
    pub fn get_str(&self, column: &str) -> Result<Option<&str>> {
        Ok(self.get(column)?.as_str())
    }

    pub fn get_i64(&self, column: &str) -> Result<Option<i64>> {
        Ok(self.get(column)?.as_i64())
    }

    pub fn get_bool(&self, column: &str) -> Result<Option<bool>> {
        Ok(self.get(column)?.as_bool())
    }

    /// Returns all column names in this row.
    pub fn columns(&self) -> Vec<&str> {
        self.values.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}

impl From<Map<String, Value>> for Row {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

/// What the executor reports for a successful native query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    pub command: String,
    pub row_count: u64,
    pub rows: Vec<Row>,
}

impl QueryOutcome {
    /// Keeps only the fields the adapter re-exposes.
    pub fn from_raw(raw: RawQueryResult) -> Self {
        Self {
            command: raw.command,
            row_count: raw.row_count,
            rows: raw.rows,
        }
    }

    /// Extracts a single row from the result.
    /// Returns an error if the result contains zero or more than one row.
    pub fn single_row(self) -> Result<Row> {
        let actual = self.rows.len();
        let mut rows = self.rows.into_iter();
        match (rows.next(), actual) {
            (Some(row), 1) => Ok(row),
            _ => Err(AdapterError::UnexpectedRowCount {
                expected: 1,
                actual,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
