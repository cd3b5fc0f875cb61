use std::path::Path;

use encoding_rs::Encoding;

use crate::{
    csv_source::CsvSource,
    error::FrameError,
    frame::{RowIter, RowSource},
    workbook_source::{self, WorkbookSource},
};

/// An input file, read as a workbook or as delimited text depending on its
/// extension.
#[derive(Debug, Clone)]
pub enum InputFile {
    Delimited(CsvSource),
    Workbook(WorkbookSource),
}

impl InputFile {
    /// `delimiter` and `encoding` only apply to delimited text; `sheet` only
    /// applies to workbooks.
    pub fn open(
        path: &Path,
        delimiter: Option<u8>,
        encoding: &'static Encoding,
        sheet: Option<&str>,
    ) -> Result<Self, FrameError> {
        if workbook_source::is_workbook(path) {
            WorkbookSource::open(path, sheet).map(Self::Workbook)
        } else {
            CsvSource::open(path, delimiter, encoding).map(Self::Delimited)
        }
    }

    pub fn delimiter(&self) -> Option<u8> {
        match self {
            Self::Delimited(source) => Some(source.delimiter()),
            Self::Workbook(_) => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Delimited(source) => format!(
                "delimiter '{}'",
                crate::io_utils::printable_delimiter(source.delimiter())
            ),
            Self::Workbook(source) => format!("sheet '{}'", source.sheet()),
        }
    }
}

impl RowSource for InputFile {
    fn columns(&self) -> &[String] {
        match self {
            Self::Delimited(source) => source.columns(),
            Self::Workbook(source) => source.columns(),
        }
    }

    fn rows(&self) -> Result<RowIter<'_>, FrameError> {
        match self {
            Self::Delimited(source) => source.rows(),
            Self::Workbook(source) => source.rows(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(name)
    }

    #[test]
    fn picks_reader_by_extension() {
        let csv =
            InputFile::open(&fixture("patients.csv"), None, encoding_rs::UTF_8, None).unwrap();
        assert!(matches!(csv, InputFile::Delimited(_)));
        assert_eq!(csv.delimiter(), Some(b','));

        let xlsx = InputFile::open(&fixture("patients.xlsx"), Some(b';'), encoding_rs::UTF_8, None)
            .unwrap();
        assert!(matches!(xlsx, InputFile::Workbook(_)));
        assert_eq!(xlsx.delimiter(), None);
        assert_eq!(xlsx.describe(), "sheet 'Patients'");
        assert_eq!(csv.columns(), xlsx.columns());
    }
}
