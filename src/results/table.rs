use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use super::row::Row;
use crate::types::{ColumnType, Value};

/// Metadata for one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Zero-based position in the select list.
    pub ordinal: usize,
}

/// Rows of a result-producing statement together with the column metadata they share.
#[derive(Debug, Clone, Serialize)]
pub struct ResultTable {
    columns: Arc<[ColumnMetadata]>,
    rows: Vec<Row>,
    #[serde(skip)]
    column_index: Arc<HashMap<String, usize>>,
}

impl ResultTable {
    pub(crate) fn new(columns: Vec<ColumnMetadata>, rows: Vec<Row>) -> Self {
        // First occurrence wins for duplicated column names.
        let mut column_index = HashMap::with_capacity(columns.len());
        for column in &columns {
            column_index
                .entry(column.name.clone())
                .or_insert(column.ordinal);
        }
        Self {
            columns: columns.into(),
            rows,
            column_index: Arc::new(column_index),
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Ordinal of a column by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    /// Value at `row` for the named column.
    ///
    /// # Arguments
    ///
    /// * `row` - Zero-based row position
    /// * `column` - Column name; the first column wins when names repeat
    ///
    /// # Returns
    ///
    /// The value, or None if either the row or the column doesn't exist
    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Convert every row into a JSON object keyed by column name.
    ///
    /// # Errors
    /// Returns `serde_json::Error` if a value cannot be represented as JSON.
    pub fn to_records(&self) -> Result<Vec<JsonValue>, serde_json::Error> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = Map::with_capacity(self.columns.len());
                for (column, value) in self.columns.iter().zip(row.values()) {
                    record.insert(column.name.clone(), serde_json::to_value(value)?);
                }
                Ok(JsonValue::Object(record))
            })
            .collect()
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Result of [`crate::Connection::execute`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ExecuteOutcome {
    /// The statement produced a result set.
    Rows(ResultTable),
    /// The statement was DML/DDL; number of rows it changed.
    Affected(usize),
}

impl ExecuteOutcome {
    #[must_use]
    pub fn table(&self) -> Option<&ResultTable> {
        match self {
            ExecuteOutcome::Rows(table) => Some(table),
            ExecuteOutcome::Affected(_) => None,
        }
    }

    #[must_use]
    pub fn into_table(self) -> Option<ResultTable> {
        match self {
            ExecuteOutcome::Rows(table) => Some(table),
            ExecuteOutcome::Affected(_) => None,
        }
    }

    #[must_use]
    pub fn affected_rows(&self) -> Option<usize> {
        match self {
            ExecuteOutcome::Affected(count) => Some(*count),
            ExecuteOutcome::Rows(_) => None,
        }
    }
}
