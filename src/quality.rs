//! Source data-quality checks run before an upload.

use serde::Serialize;

use crate::{error::FrameError, frame::RowSource};

/// Columns emptier than this share of scanned rows are reported.
pub const SPARSE_COLUMN_RATIO: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SparseColumn {
    pub name: String,
    pub empty_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualityReport {
    pub rows_scanned: usize,
    pub empty_rows: usize,
    pub sparse_columns: Vec<SparseColumn>,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.empty_rows == 0 && self.sparse_columns.is_empty()
    }

    pub fn notes(&self) -> Vec<String> {
        let mut notes = Vec::new();
        if self.empty_rows > 0 {
            notes.push(format!("{} completely empty row(s)", self.empty_rows));
        }
        for column in &self.sparse_columns {
            notes.push(format!(
                "column '{}' is {:.0}% empty",
                column.name,
                column.empty_ratio * 100.0
            ));
        }
        notes
    }
}

/// Scans up to `limit` rows (all rows when `None`).
pub fn assess<S>(source: &S, limit: Option<usize>) -> Result<QualityReport, FrameError>
where
    S: RowSource + ?Sized,
{
    let columns = source.columns();
    let mut empty_counts = vec![0usize; columns.len()];
    let mut report = QualityReport::default();
    for row in source.rows()?.take(limit.unwrap_or(usize::MAX)) {
        let row = row?;
        report.rows_scanned += 1;
        let mut all_empty = true;
        for (idx, count) in empty_counts.iter_mut().enumerate() {
            match row.get(idx) {
                Some(value) if !value.is_null_equivalent() => all_empty = false,
                _ => *count += 1,
            }
        }
        if all_empty {
            report.empty_rows += 1;
        }
    }
    if report.rows_scanned > 0 {
        report.sparse_columns = columns
            .iter()
            .zip(&empty_counts)
            .map(|(name, count)| SparseColumn {
                name: name.clone(),
                empty_ratio: *count as f64 / report.rows_scanned as f64,
            })
            .filter(|c| c.empty_ratio > SPARSE_COLUMN_RATIO)
            .collect();
    }
    Ok(report)
}
