//! Bulk loading: clear, reconcile, coerce, and stream batches to the
//! destination, committing after every batch.
//!
//! An upload is not atomic across batches. When batch `k` fails, batches
//! `1..k` stay committed, the open transaction is rolled back, and nothing
//! after `k` is attempted. The outcome is always reported as an
//! [`UploadResult`]; only setup failures (bad table reference, unreadable
//! metadata, failed clear, unreadable source) return [`LoadError`].

use std::{fmt, str::FromStr};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize, Serializer};

use crate::{
    destination::{Connection, Row, Statement},
    error::{DriverError, LoadError, UploadError},
    frame::{RowIter, RowSource},
    introspect,
    pipeline::{Pipeline, UploadDiagnostics},
    reconcile::SchemaReconciler,
    similarity::{DEFAULT_MATCH_THRESHOLD, SimilarityKind},
    table_name::TableName,
};

pub const DEFAULT_BATCH_SIZE: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Append,
    /// Delete every destination row before the first batch.
    Replace,
    /// Legacy clear via `TRUNCATE TABLE`, falling back to `DELETE`.
    Truncate,
}

impl UploadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadMode::Append => "append",
            UploadMode::Replace => "delete",
            UploadMode::Truncate => "truncate",
        }
    }

    fn clears(&self) -> bool {
        !matches!(self, UploadMode::Append)
    }
}

impl FromStr for UploadMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(UploadMode::Append),
            "delete" | "replace" => Ok(UploadMode::Replace),
            "truncate" => Ok(UploadMode::Truncate),
            other => Err(format!(
                "unknown upload mode '{other}' (expected append, delete, or truncate)"
            )),
        }
    }
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub batch_size: usize,
    pub match_threshold: f64,
    pub similarity: SimilarityKind,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            similarity: SimilarityKind::default(),
        }
    }
}

impl LoadOptions {
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.batch_size == 0 {
            return Err(LoadError::Options("batch size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(LoadError::Options(format!(
                "match threshold {} is outside [0, 1]",
                self.match_threshold
            )));
        }
        Ok(())
    }

    pub fn reconciler(&self) -> SchemaReconciler {
        SchemaReconciler::new(self.similarity.strategy(), self.match_threshold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum UploadState {
    Idle,
    Clearing,
    Cleared,
    Streaming { next_batch: usize },
    Done,
    Failed { batch: usize },
}

/// A contiguous run of coerced rows, numbered from 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub sequence: usize,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub sequence: usize,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub table: String,
    pub mode: UploadMode,
    pub rows_uploaded: u64,
    pub batches_committed: usize,
    pub diagnostics: UploadDiagnostics,
    #[serde(serialize_with = "serialize_terminal_error")]
    pub terminal_error: Option<UploadError>,
}

impl UploadResult {
    pub fn is_success(&self) -> bool {
        self.terminal_error.is_none()
    }
}

fn serialize_terminal_error<S>(error: &Option<UploadError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match error {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

pub struct BulkLoader<'c, C: Connection + ?Sized> {
    conn: &'c mut C,
    options: LoadOptions,
    reconciler: SchemaReconciler,
}

impl<'c, C: Connection + ?Sized> BulkLoader<'c, C> {
    pub fn new(conn: &'c mut C, options: LoadOptions) -> Result<Self, LoadError> {
        options.validate()?;
        let reconciler = options.reconciler();
        Ok(Self {
            conn,
            options,
            reconciler,
        })
    }

    pub fn with_reconciler(mut self, reconciler: SchemaReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Runs the whole upload, committing batch by batch.
    pub fn upload<S>(
        &mut self,
        table: &str,
        source: &S,
        mode: UploadMode,
    ) -> Result<UploadResult, LoadError>
    where
        S: RowSource + ?Sized,
    {
        let mut session = self.begin(table, source, mode)?;
        while session.next_batch().is_some() {}
        Ok(session.finish())
    }

    /// Performs setup (lookup, reconciliation, clearing) and returns a
    /// session that writes one batch per [`UploadSession::next_batch`] call.
    pub fn begin<'s, S>(
        &'s mut self,
        table: &str,
        source: &'s S,
        mode: UploadMode,
    ) -> Result<UploadSession<'s, C>, LoadError>
    where
        S: RowSource + ?Sized,
    {
        let name = TableName::parse(table)?;
        let destination = introspect::get_columns(&mut *self.conn, &name)?;
        debug!(
            "Destination {} has {} column(s): {}",
            name,
            destination.len(),
            destination
                .iter()
                .map(|c| format!("{} {}", c.name, c.describe_type()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let pipeline = Pipeline::new(&self.reconciler, source.columns(), &destination);
        log_reconciliation(&name, &pipeline);

        let rows = source.rows()?;

        let mut state = UploadState::Idle;
        if mode.clears() {
            state = transition(&name, state, UploadState::Clearing);
            clear(&mut *self.conn, &name, mode).map_err(|err| {
                error!("Clearing {name} failed: {err}");
                LoadError::Clear {
                    table: name.to_string(),
                    source: err,
                }
            })?;
            state = transition(&name, state, UploadState::Cleared);
        }
        let state = transition(&name, state, UploadState::Streaming { next_batch: 1 });

        let insert = Statement::Insert {
            table: name.clone(),
            columns: pipeline.mapping().destination_names(),
        };
        debug!("{}", insert.to_sql());

        Ok(UploadSession {
            conn: &mut *self.conn,
            table: name,
            mode,
            insert,
            rows,
            pipeline,
            batch_size: self.options.batch_size,
            state,
            rows_uploaded: 0,
            batches_committed: 0,
            terminal_error: None,
        })
    }
}

fn transition(table: &TableName, from: UploadState, to: UploadState) -> UploadState {
    debug!("{table}: {from:?} -> {to:?}");
    to
}

fn log_reconciliation(table: &TableName, pipeline: &Pipeline) {
    let diagnostics = pipeline.reconciliation();
    for fuzzy in &diagnostics.fuzzy_matches {
        info!(
            "Matched source column '{}' to {}.{} (similarity {:.3})",
            fuzzy.source, table, fuzzy.destination, fuzzy.score
        );
    }
    if !diagnostics.missing_columns.is_empty() {
        warn!(
            "{} column(s) of {} have no source and will be null: {}",
            diagnostics.missing_columns.len(),
            table,
            diagnostics.missing_column_names().join(", ")
        );
    }
    if !diagnostics.extra_columns.is_empty() {
        warn!(
            "Dropping {} unmatched source column(s): {}",
            diagnostics.extra_columns.len(),
            diagnostics.extra_columns.join(", ")
        );
    }
}

fn clear<C>(conn: &mut C, table: &TableName, mode: UploadMode) -> Result<(), DriverError>
where
    C: Connection + ?Sized,
{
    let delete = Statement::DeleteAll {
        table: table.clone(),
    };
    if mode == UploadMode::Truncate {
        let truncate = Statement::Truncate {
            table: table.clone(),
        };
        debug!("{}", truncate.to_sql());
        match conn.execute(&truncate) {
            Ok(_) => return commit_clear(conn, table),
            Err(err) => {
                warn!("TRUNCATE of {table} was rejected ({err}); deleting rows instead");
                conn.rollback()?;
            }
        }
    }
    debug!("{}", delete.to_sql());
    let removed = match conn.execute(&delete) {
        Ok(removed) => removed,
        Err(err) => {
            if let Err(rollback) = conn.rollback() {
                warn!("Rollback after failed clear of {table} also failed: {rollback}");
            }
            return Err(err);
        }
    };
    info!("Deleted {removed} existing row(s) from {table}");
    commit_clear(conn, table)
}

fn commit_clear<C>(conn: &mut C, table: &TableName) -> Result<(), DriverError>
where
    C: Connection + ?Sized,
{
    conn.commit()?;
    debug!("Cleared {table}");
    Ok(())
}

pub struct UploadSession<'s, C: Connection + ?Sized> {
    conn: &'s mut C,
    table: TableName,
    mode: UploadMode,
    insert: Statement,
    rows: RowIter<'s>,
    pipeline: Pipeline,
    batch_size: usize,
    state: UploadState,
    rows_uploaded: u64,
    batches_committed: usize,
    terminal_error: Option<UploadError>,
}

impl<C: Connection + ?Sized> UploadSession<'_, C> {
    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn rows_uploaded(&self) -> u64 {
        self.rows_uploaded
    }

    pub fn batches_committed(&self) -> usize {
        self.batches_committed
    }

    /// Writes and commits the next batch. Returns `None` once the source is
    /// exhausted or after a failure.
    pub fn next_batch(&mut self) -> Option<Result<BatchReport, UploadError>> {
        let UploadState::Streaming { next_batch } = self.state else {
            return None;
        };
        let batch = match self.read_batch(next_batch) {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                self.state = UploadState::Done;
                return None;
            }
            Err(err) => return Some(Err(self.fail(err))),
        };

        let count = batch.rows.len();
        if let Err(err) = self.conn.execute_many(&self.insert, &batch.rows) {
            return Some(Err(self.fail(UploadError::from_driver(batch.sequence, err))));
        }
        if let Err(err) = self.conn.commit() {
            return Some(Err(self.fail(UploadError::from_driver(batch.sequence, err))));
        }

        self.rows_uploaded += count as u64;
        self.batches_committed = batch.sequence;
        self.state = if count < self.batch_size {
            UploadState::Done
        } else {
            UploadState::Streaming {
                next_batch: batch.sequence + 1,
            }
        };
        info!(
            "Committed batch {} ({} row(s)) to {}; {} row(s) so far",
            batch.sequence, count, self.table, self.rows_uploaded
        );
        Some(Ok(BatchReport {
            sequence: batch.sequence,
            rows: count,
        }))
    }

    fn read_batch(&mut self, sequence: usize) -> Result<Option<Batch>, UploadError> {
        let mut rows = Vec::with_capacity(self.batch_size.min(DEFAULT_BATCH_SIZE));
        while rows.len() < self.batch_size {
            match self.rows.next() {
                Some(Ok(raw)) => rows.push(self.pipeline.apply(&raw)),
                Some(Err(err)) => {
                    return Err(UploadError::SourceRead {
                        batch: sequence,
                        message: err.to_string(),
                    });
                }
                None => break,
            }
        }
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(Batch { sequence, rows }))
    }

    fn fail(&mut self, err: UploadError) -> UploadError {
        error!(
            "Upload to {} stopped at batch {}: {err}; {} batch(es) remain committed",
            self.table,
            err.batch(),
            self.batches_committed
        );
        if let Err(rollback) = self.conn.rollback() {
            warn!("Rollback on {} failed: {rollback}", self.table);
        }
        self.state = UploadState::Failed { batch: err.batch() };
        self.terminal_error = Some(err.clone());
        err
    }

    /// Ends the session. Stopping before the source is exhausted leaves the
    /// committed batches in place and reports no error.
    pub fn finish(self) -> UploadResult {
        let diagnostics = self.pipeline.diagnostics();
        if diagnostics.truncated_value_count > 0 || diagnostics.degraded_value_count > 0 {
            warn!(
                "{}: {} value(s) truncated, {} value(s) could not be converted and were nulled",
                self.table, diagnostics.truncated_value_count, diagnostics.degraded_value_count
            );
        }
        info!(
            "Upload to {} ({}) finished: {} row(s) in {} batch(es)",
            self.table, self.mode, self.rows_uploaded, self.batches_committed
        );
        UploadResult {
            table: self.table.to_string(),
            mode: self.mode,
            rows_uploaded: self.rows_uploaded,
            batches_committed: self.batches_committed,
            diagnostics,
            terminal_error: self.terminal_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_parse_with_aliases() {
        assert_eq!("append".parse::<UploadMode>(), Ok(UploadMode::Append));
        assert_eq!("DELETE".parse::<UploadMode>(), Ok(UploadMode::Replace));
        assert_eq!("replace".parse::<UploadMode>(), Ok(UploadMode::Replace));
        assert_eq!("truncate".parse::<UploadMode>(), Ok(UploadMode::Truncate));
        assert!("merge".parse::<UploadMode>().is_err());
        assert_eq!(UploadMode::Replace.to_string(), "delete");
    }

    #[test]
    fn options_reject_zero_batch_size() {
        let options = LoadOptions {
            batch_size: 0,
            ..LoadOptions::default()
        };
        assert!(matches!(options.validate(), Err(LoadError::Options(_))));
        let bad_threshold = LoadOptions {
            match_threshold: 1.5,
            ..LoadOptions::default()
        };
        assert!(bad_threshold.validate().is_err());
        assert!(LoadOptions::default().validate().is_ok());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: LoadOptions = serde_yaml::from_str("batch_size: 10").unwrap();
        assert_eq!(options.batch_size, 10);
        assert_eq!(options.match_threshold, DEFAULT_MATCH_THRESHOLD);
        assert_eq!(options.similarity, SimilarityKind::Lcs);
    }
}
