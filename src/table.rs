//! CSV table loading. Tables are read headerless, every cell is cleaned on
//! the way in, and single-column tables are widened so the annotation loop
//! always has a subject column plus at least one value column.

use std::path::Path;

use anyhow::{Context, Result};
use csv::ReaderBuilder;

use crate::normalize::clean_cell;

#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Loads a table from a CSV file. The file stem becomes the table name
    /// used in annotations.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .with_context(|| format!("invalid table file name: {}", path.display()))?
            .to_string();
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("failed to open table: {}", path.display()))?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.with_context(|| format!("failed to read row from {}", path.display()))?;
            let row: Vec<String> = record.iter().map(clean_cell).collect();
            rows.push(row);
        }

        let mut table = Table { name, rows };
        table.widen_single_column();
        Ok(table)
    }

    /// A table with only a subject column has nothing to pair it against, so
    /// the column is duplicated and matched against itself.
    fn widen_single_column(&mut self) {
        if self.rows.is_empty() || self.rows.iter().any(|row| row.len() != 1) {
            return;
        }
        for row in &mut self.rows {
            let cell = row[0].clone();
            row.push(cell);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column count of the header row. Data rows may be ragged and are
    /// handled cell by cell.
    pub fn column_count(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(column)).map(String::as_str)
    }

    /// Row indices carrying data, skipping the header row.
    pub fn data_rows(&self) -> std::ops::Range<usize> {
        if self.rows.len() < 2 {
            0..0
        } else {
            1..self.rows.len()
        }
    }

    #[cfg(test)]
    pub fn from_rows(name: &str, rows: Vec<Vec<String>>) -> Self {
        let mut table = Table {
            name: name.to_string(),
            rows,
        };
        table.widen_single_column();
        table
    }
}
