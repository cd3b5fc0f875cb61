//! Row sources: the producer side of an upload.
//!
//! A [`RowSource`] is a finite, restartable sequence of raw rows over a
//! fixed column list. Each call to [`RowSource::rows`] starts again from the
//! first row, which lets the same source be uploaded more than once.

use crate::{data::RawValue, error::FrameError};

pub type RawRow = Vec<RawValue>;
pub type RowIter<'a> = Box<dyn Iterator<Item = Result<RawRow, FrameError>> + 'a>;

pub trait RowSource {
    fn columns(&self) -> &[String];

    fn rows(&self) -> Result<RowIter<'_>, FrameError>;
}

impl<S: RowSource + ?Sized> RowSource for &S {
    fn columns(&self) -> &[String] {
        (**self).columns()
    }

    fn rows(&self) -> Result<RowIter<'_>, FrameError> {
        (**self).rows()
    }
}

/// An in-memory frame. Short rows are padded with nulls; rows wider than the
/// column list are rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceFrame {
    columns: Vec<String>,
    rows: Vec<RawRow>,
}

impl SourceFrame {
    pub fn new(columns: Vec<String>, rows: Vec<RawRow>) -> Result<Self, FrameError> {
        let expected = columns.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, mut row)| {
                if row.len() > expected {
                    return Err(FrameError::RowWidth {
                        row: idx + 1,
                        found: row.len(),
                        expected,
                    });
                }
                row.resize(expected, RawValue::Null);
                Ok(row)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { columns, rows })
    }

    /// Builds a frame from name/value records. Columns appear in first-seen
    /// order; a record lacking a column holds null there.
    pub fn from_records<I, R, K, V>(records: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RawValue>,
    {
        let mut columns: Vec<String> = Vec::new();
        let mut rows: Vec<RawRow> = Vec::new();
        for record in records {
            let mut row = vec![RawValue::Null; columns.len()];
            for (key, value) in record {
                let key = key.into();
                let idx = match columns.iter().position(|c| *c == key) {
                    Some(idx) => idx,
                    None => {
                        columns.push(key);
                        columns.len() - 1
                    }
                };
                if row.len() <= idx {
                    row.resize(idx + 1, RawValue::Null);
                }
                row[idx] = value.into();
            }
            rows.push(row);
        }
        for row in &mut rows {
            row.resize(columns.len(), RawValue::Null);
        }
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row_slice(&self) -> &[RawRow] {
        &self.rows
    }
}

impl RowSource for SourceFrame {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn rows(&self) -> Result<RowIter<'_>, FrameError> {
        Ok(Box::new(self.rows.iter().cloned().map(Ok)))
    }
}
