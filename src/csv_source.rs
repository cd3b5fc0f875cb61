use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use log::debug;

use crate::{
    data::RawValue,
    error::FrameError,
    frame::{RowIter, RowSource},
    io_utils,
};

/// A delimited text file read lazily, one record at a time. Every cell is
/// handed to the loader as text; typing happens during coercion.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    delimiter: u8,
    encoding: &'static Encoding,
    columns: Vec<String>,
}

impl CsvSource {
    pub fn open(
        path: &Path,
        delimiter: Option<u8>,
        encoding: &'static Encoding,
    ) -> Result<Self, FrameError> {
        let delimiter = io_utils::delimiter_for(path, delimiter);
        let mut reader = io_utils::open_csv_reader(path, delimiter)
            .map_err(|err| FrameError::Open(format!("{err:#}")))?;
        let columns = reader
            .byte_headers()
            .map_err(anyhow::Error::from)
            .and_then(|headers| io_utils::decode_record(headers, encoding))
            .map_err(|err| FrameError::Open(format!("Reading headers from {path:?}: {err:#}")))?;
        debug!(
            "Opened {:?} with delimiter '{}' and {} column(s)",
            path,
            io_utils::printable_delimiter(delimiter),
            columns.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            delimiter,
            encoding,
            columns,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }
}

impl RowSource for CsvSource {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn rows(&self) -> Result<RowIter<'_>, FrameError> {
        let reader = io_utils::open_csv_reader(&self.path, self.delimiter)
            .map_err(|err| FrameError::Open(format!("{err:#}")))?;
        let encoding = self.encoding;
        Ok(Box::new(reader.into_byte_records().enumerate().map(
            move |(idx, record)| {
                let row = idx + 1;
                let record = record.map_err(|err| FrameError::Read {
                    row,
                    message: err.to_string(),
                })?;
                let fields = io_utils::decode_record(&record, encoding).map_err(|err| {
                    FrameError::Read {
                        row,
                        message: err.to_string(),
                    }
                })?;
                Ok(fields.into_iter().map(RawValue::Text).collect())
            },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::UTF_8;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_text_cells_and_restarts() {
        let file = write_temp("Patient ID,FullName\n7,A. Smith\n8,\n");
        let source = CsvSource::open(file.path(), None, UTF_8).unwrap();
        assert_eq!(source.columns(), ["Patient ID", "FullName"]);
        let rows = source.rows().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(
            rows,
            vec![
                vec![RawValue::from("7"), RawValue::from("A. Smith")],
                vec![RawValue::from("8"), RawValue::from("")],
            ]
        );
        assert_eq!(source.rows().unwrap().count(), 2);
    }

    #[test]
    fn ragged_records_surface_as_read_errors() {
        let file = write_temp("a,b\n1,2\n3,4,5\n");
        let source = CsvSource::open(file.path(), None, UTF_8).unwrap();
        let results: Vec<_> = source.rows().unwrap().collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(FrameError::Read { row: 2, .. })));
    }
}
