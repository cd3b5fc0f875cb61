use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use calamine::{Data, Range, Reader, Sheets, open_workbook_auto};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use log::debug;

use crate::{
    data::RawValue,
    error::FrameError,
    frame::{RawRow, RowIter, RowSource},
};

/// One worksheet of an Excel (`.xlsx`, `.xlsm`, `.xlsb`, `.xls`) or
/// OpenDocument workbook. The first used row holds the column names.
///
/// Cells keep the type the workbook stored: numbers stay numeric, booleans
/// stay boolean, and date-formatted cells arrive as timestamps. Each pass
/// reopens the workbook.
#[derive(Debug, Clone)]
pub struct WorkbookSource {
    path: PathBuf,
    sheet: String,
    columns: Vec<String>,
}

impl WorkbookSource {
    /// Opens `sheet`, or the first worksheet when none is named.
    pub fn open(path: &Path, sheet: Option<&str>) -> Result<Self, FrameError> {
        let mut workbook = open(path)?;
        let sheet = match sheet {
            Some(name) => name.to_string(),
            None => workbook.sheet_names().into_iter().next().ok_or_else(|| {
                FrameError::Open(format!("Workbook {path:?} has no worksheets"))
            })?,
        };
        let range = read_sheet(&mut workbook, path, &sheet)?;
        let columns = range
            .rows()
            .next()
            .map(|header| {
                header
                    .iter()
                    .enumerate()
                    .map(|(idx, cell)| header_name(idx, cell))
                    .collect()
            })
            .unwrap_or_default();
        debug!(
            "Opened sheet '{}' of {:?}: {} column(s), {} data row(s)",
            sheet,
            path,
            range.width(),
            range.height().saturating_sub(1)
        );
        Ok(Self {
            path: path.to_path_buf(),
            sheet,
            columns,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }
}

impl RowSource for WorkbookSource {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn rows(&self) -> Result<RowIter<'_>, FrameError> {
        let mut workbook = open(&self.path)?;
        let range = read_sheet(&mut workbook, &self.path, &self.sheet)?;
        let width = self.columns.len();
        let rows: Vec<RawRow> = range
            .rows()
            .skip(1)
            .map(|cells| {
                let mut row: RawRow = cells.iter().map(raw_value).collect();
                row.resize(width, RawValue::Null);
                row
            })
            .collect();
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}

/// File extensions read as workbooks rather than delimited text.
pub fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ["xlsx", "xlsm", "xlsb", "xls", "ods"]
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn open(path: &Path) -> Result<Sheets<BufReader<File>>, FrameError> {
    open_workbook_auto(path)
        .map_err(|err| FrameError::Open(format!("Opening workbook {path:?}: {err}")))
}

fn read_sheet(
    workbook: &mut Sheets<BufReader<File>>,
    path: &Path,
    sheet: &str,
) -> Result<Range<Data>, FrameError> {
    workbook
        .worksheet_range(sheet)
        .map_err(|err| FrameError::Open(format!("Reading sheet '{sheet}' of {path:?}: {err}")))
}

fn header_name(idx: usize, cell: &Data) -> String {
    let name = cell.to_string();
    let name = name.trim();
    if name.is_empty() {
        format!("Unnamed: {idx}")
    } else {
        name.to_string()
    }
}

fn raw_value(cell: &Data) -> RawValue {
    match cell {
        Data::Empty | Data::Error(_) => RawValue::Null,
        Data::Int(i) => RawValue::Integer(*i),
        Data::Float(f) => RawValue::Float(*f),
        Data::Bool(b) => RawValue::Boolean(*b),
        Data::String(text) => RawValue::Text(text.clone()),
        Data::DateTime(value) if value.is_datetime() => {
            serial_to_datetime(value.as_f64()).map_or(RawValue::Null, RawValue::DateTime)
        }
        // durations have no calendar meaning; keep the day count
        Data::DateTime(value) => RawValue::Float(value.as_f64()),
        Data::DateTimeIso(text) | Data::DurationIso(text) => RawValue::Text(text.clone()),
    }
}

/// Excel serial day numbers count from 1899-12-30 in the 1900 date system.
fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(TimeDelta::try_milliseconds(millis)?)
}
