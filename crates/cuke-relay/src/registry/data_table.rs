//! Data tables handed to step handlers.

use std::collections::HashMap;

use crate::messages::PickleTable;

/// A step's data table, read as rows of cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTable {
    rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Every row including the header.
    pub fn raw(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Every row except the first.
    pub fn rows(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or_default()
    }

    /// One map per body row, keyed by the header row.
    pub fn hashes(&self) -> Vec<HashMap<String, String>> {
        let Some((header, body)) = self.rows.split_first() else {
            return Vec::new();
        };
        body.iter()
            .map(|row| header.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }

    /// First column to second column. Every row must have exactly two cells.
    pub fn rows_hash(&self) -> anyhow::Result<HashMap<String, String>> {
        self.rows
            .iter()
            .map(|row| match row.as_slice() {
                [key, value] => Ok((key.clone(), value.clone())),
                _ => anyhow::bail!(
                    "rows_hash can only be called on a data table where all rows have exactly two columns"
                ),
            })
            .collect()
    }

    pub fn transpose(&self) -> DataTable {
        let width = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        let rows = (0..width)
            .map(|column| {
                self.rows
                    .iter()
                    .map(|row| row.get(column).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        DataTable { rows }
    }
}

impl From<&PickleTable> for DataTable {
    fn from(table: &PickleTable) -> Self {
        DataTable::new(
            table
                .rows
                .iter()
                .map(|row| row.cells.iter().map(|cell| cell.value.clone()).collect())
                .collect(),
        )
    }
}
