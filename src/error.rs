//! Error taxonomy for the load engine.
//!
//! Only setup failures ([`NameParseError`], [`SchemaLookupError`], a failed
//! destructive clear) surface as [`LoadError`]. Per-batch failures are
//! reported through [`UploadError`] inside the upload result so committed
//! progress is never hidden behind a bare error.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NameParseError {
    #[error("table reference is empty")]
    Empty,
    #[error("table reference '{input}' has {count} segment(s); expected 1 to 3")]
    SegmentCount { input: String, count: usize },
    #[error("table reference '{input}' contains an empty segment")]
    EmptySegment { input: String },
    #[error("table reference '{input}' has an unterminated '[' delimiter")]
    UnterminatedBracket { input: String },
    #[error("unexpected character '{found}' after ']' in table reference '{input}'")]
    TrailingCharacters { input: String, found: char },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    ObjectNotFound,
    PermissionDenied,
    Truncation,
    TypeConversion,
    ConstraintViolation,
    Connectivity,
    Unsupported,
    Other,
}

impl DriverErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverErrorKind::ObjectNotFound => "object not found",
            DriverErrorKind::PermissionDenied => "permission denied",
            DriverErrorKind::Truncation => "truncation",
            DriverErrorKind::TypeConversion => "type conversion",
            DriverErrorKind::ConstraintViolation => "constraint violation",
            DriverErrorKind::Connectivity => "connectivity",
            DriverErrorKind::Unsupported => "unsupported",
            DriverErrorKind::Other => "driver error",
        }
    }
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a live destination connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaLookupError {
    #[error("table {table} was not found or exposes no columns")]
    NotFound { table: String },
    #[error("metadata for {table} is not accessible: {source}")]
    AccessDenied {
        table: String,
        #[source]
        source: DriverError,
    },
    #[error("metadata query for {table} failed: {source}")]
    Query {
        table: String,
        #[source]
        source: DriverError,
    },
}

/// A batch that could not be written. Batches committed before it stay
/// committed; the failing batch and everything after it are lost.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("batch {batch}: value would be truncated by the destination: {message}")]
    Truncation { batch: usize, message: String },
    #[error("batch {batch}: destination rejected a value conversion: {message}")]
    TypeConversion { batch: usize, message: String },
    #[error("batch {batch}: constraint violation: {message}")]
    ConstraintViolation { batch: usize, message: String },
    #[error("batch {batch}: connection lost: {message}")]
    ConnectivityLoss { batch: usize, message: String },
    #[error("batch {batch}: failed reading source rows: {message}")]
    SourceRead { batch: usize, message: String },
    #[error("batch {batch}: {message}")]
    Other { batch: usize, message: String },
}

impl UploadError {
    pub fn from_driver(batch: usize, err: DriverError) -> Self {
        let message = err.message;
        match err.kind {
            DriverErrorKind::Truncation => UploadError::Truncation { batch, message },
            DriverErrorKind::TypeConversion => UploadError::TypeConversion { batch, message },
            DriverErrorKind::ConstraintViolation => {
                UploadError::ConstraintViolation { batch, message }
            }
            DriverErrorKind::Connectivity => UploadError::ConnectivityLoss { batch, message },
            DriverErrorKind::ObjectNotFound
            | DriverErrorKind::PermissionDenied
            | DriverErrorKind::Unsupported
            | DriverErrorKind::Other => UploadError::Other {
                batch,
                message: format!("{}: {message}", err.kind),
            },
        }
    }

    pub fn batch(&self) -> usize {
        match self {
            UploadError::Truncation { batch, .. }
            | UploadError::TypeConversion { batch, .. }
            | UploadError::ConstraintViolation { batch, .. }
            | UploadError::ConnectivityLoss { batch, .. }
            | UploadError::SourceRead { batch, .. }
            | UploadError::Other { batch, .. } => *batch,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("row {row} has {found} value(s) but the source declares {expected} column(s)")]
    RowWidth {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("failed reading source row {row}: {message}")]
    Read { row: usize, message: String },
    #[error("failed opening source: {0}")]
    Open(String),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    NameParse(#[from] NameParseError),
    #[error(transparent)]
    SchemaLookup(#[from] SchemaLookupError),
    #[error("clearing {table} before load failed: {source}")]
    Clear {
        table: String,
        #[source]
        source: DriverError,
    },
    #[error(transparent)]
    Source(#[from] FrameError),
    #[error("invalid load options: {0}")]
    Options(String),
}
