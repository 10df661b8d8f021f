//! Transport-independent query results.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Describes one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub column_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>, length: Option<u32>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            length,
        }
    }
}

/// Columns, rows and affected-row count of one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rows_affected: Option<i64>,
}

impl QueryResult {
    /// Build a result. When columns are known, rows longer than the column
    /// list are truncated to it.
    pub fn new(columns: Vec<ColumnMeta>, mut rows: Vec<Vec<Value>>, rows_affected: Option<i64>) -> Self {
        if !columns.is_empty() {
            for row in &mut rows {
                row.truncate(columns.len());
            }
        }
        Self {
            columns,
            rows,
            rows_affected,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows_affected(&self) -> Option<i64> {
        self.rows_affected
    }

    /// Position of the first column called `name` (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Value at `row` for column `name`.
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.rows.get(row)?.get(idx)
    }

    /// Column names as used for map keys: blank or repeated names become
    /// `col<i>`.
    pub fn key_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let name = c.name.trim();
                if name.is_empty() || !seen.insert(name.to_string()) {
                    format!("col{i}")
                } else {
                    name.to_string()
                }
            })
            .collect()
    }

    /// One ordered name→value map per row, keys in column order.
    pub fn to_map_list(&self) -> Vec<RowMap> {
        let names = self.key_names();
        self.rows
            .iter()
            .map(|row| RowMap {
                entries: names
                    .iter()
                    .zip(row.iter())
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect(),
            })
            .collect()
    }
}

/// Ordered name→value mapping for one row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowMap {
    entries: Vec<(String, Value)>,
}

impl RowMap {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
