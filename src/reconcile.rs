//! Source-to-destination column reconciliation.
//!
//! Matching is greedy and order sensitive: an exact pass claims
//! case-insensitive equal names in destination order, then a fuzzy pass
//! lets each still-unmatched destination column claim its best-scoring
//! unclaimed source column. A claim is never revisited, even when a later
//! destination column would have scored higher against the same source.

use serde::Serialize;

use crate::{
    data::RawValue,
    schema::DestinationColumn,
    similarity::{DEFAULT_MATCH_THRESHOLD, LcsRatio, SimilarityStrategy},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Fuzzy { score: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceBinding {
    pub name: String,
    pub position: usize,
    pub kind: MatchKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedColumn {
    pub destination: DestinationColumn,
    pub source: Option<SourceBinding>,
}

/// One entry per destination column, in destination order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMapping {
    columns: Vec<MappedColumn>,
}

impl ColumnMapping {
    pub fn columns(&self) -> &[MappedColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn destination_columns(&self) -> Vec<DestinationColumn> {
        self.columns.iter().map(|c| c.destination.clone()).collect()
    }

    pub fn destination_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| c.destination.name.clone())
            .collect()
    }

    pub fn claimed_count(&self) -> usize {
        self.columns.iter().filter(|c| c.source.is_some()).count()
    }

    pub fn source_for(&self, destination: &str) -> Option<&SourceBinding> {
        self.columns
            .iter()
            .find(|c| c.destination.name == destination)
            .and_then(|c| c.source.as_ref())
    }

    /// Rebuilds a source row in destination order; unmatched columns and
    /// short rows yield [`RawValue::Null`].
    pub fn project(&self, row: &[RawValue]) -> Vec<RawValue> {
        self.columns
            .iter()
            .map(|column| {
                column
                    .source
                    .as_ref()
                    .and_then(|binding| row.get(binding.position))
                    .cloned()
                    .unwrap_or_default()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuzzyMatch {
    pub source: String,
    pub destination: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationDiagnostics {
    pub missing_columns: Vec<DestinationColumn>,
    pub extra_columns: Vec<String>,
    pub fuzzy_matches: Vec<FuzzyMatch>,
}

impl ReconciliationDiagnostics {
    pub fn missing_column_names(&self) -> Vec<String> {
        self.missing_columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_warnings(&self) -> bool {
        !self.missing_columns.is_empty() || !self.extra_columns.is_empty()
    }
}

pub struct SchemaReconciler {
    strategy: Box<dyn SimilarityStrategy>,
    threshold: f64,
}

impl Default for SchemaReconciler {
    fn default() -> Self {
        Self::new(Box::new(LcsRatio), DEFAULT_MATCH_THRESHOLD)
    }
}

impl SchemaReconciler {
    pub fn new(strategy: Box<dyn SimilarityStrategy>, threshold: f64) -> Self {
        Self {
            strategy,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn strategy(&self) -> &dyn SimilarityStrategy {
        self.strategy.as_ref()
    }

    pub fn match_columns(
        &self,
        source_columns: &[String],
        destination: &[DestinationColumn],
    ) -> (ColumnMapping, ReconciliationDiagnostics) {
        let source_keys: Vec<String> = source_columns.iter().map(|c| comparison_key(c)).collect();
        let mut claimed = vec![false; source_columns.len()];
        let mut bindings: Vec<Option<SourceBinding>> = vec![None; destination.len()];

        for (dest_idx, column) in destination.iter().enumerate() {
            let key = comparison_key(&column.name);
            let found = source_keys
                .iter()
                .enumerate()
                .find(|(idx, candidate)| !claimed[*idx] && **candidate == key)
                .map(|(idx, _)| idx);
            if let Some(position) = found {
                claimed[position] = true;
                bindings[dest_idx] = Some(SourceBinding {
                    name: source_columns[position].clone(),
                    position,
                    kind: MatchKind::Exact,
                });
            }
        }

        let mut fuzzy_matches = Vec::new();
        for (dest_idx, column) in destination.iter().enumerate() {
            if bindings[dest_idx].is_some() {
                continue;
            }
            let key = comparison_key(&column.name);
            let mut best: Option<(usize, f64)> = None;
            for (position, candidate) in source_keys.iter().enumerate() {
                if claimed[position] {
                    continue;
                }
                let score = self.strategy.score(candidate, &key);
                if score < self.threshold {
                    continue;
                }
                // strictly greater keeps the earliest source on ties
                if best.is_none_or(|(_, best_score)| score > best_score) {
                    best = Some((position, score));
                }
            }
            if let Some((position, score)) = best {
                claimed[position] = true;
                fuzzy_matches.push(FuzzyMatch {
                    source: source_columns[position].clone(),
                    destination: column.name.clone(),
                    score,
                });
                bindings[dest_idx] = Some(SourceBinding {
                    name: source_columns[position].clone(),
                    position,
                    kind: MatchKind::Fuzzy { score },
                });
            }
        }

        let missing_columns = destination
            .iter()
            .zip(&bindings)
            .filter(|(_, binding)| binding.is_none())
            .map(|(column, _)| column.clone())
            .collect();
        let extra_columns = source_columns
            .iter()
            .zip(&claimed)
            .filter(|(_, claimed)| !**claimed)
            .map(|(name, _)| name.clone())
            .collect();

        let mapping = ColumnMapping {
            columns: destination
                .iter()
                .cloned()
                .zip(bindings)
                .map(|(destination, source)| MappedColumn {
                    destination,
                    source,
                })
                .collect(),
        };
        let diagnostics = ReconciliationDiagnostics {
            missing_columns,
            extra_columns,
            fuzzy_matches,
        };
        (mapping, diagnostics)
    }
}

/// Names compare trimmed and lower-cased; output keeps the original text.
pub fn comparison_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDetection {
    pub index: usize,
    pub score: f64,
}

/// Minimum share of a candidate's columns that must be recognisable before
/// it is accepted as the target of a file.
pub const DETECTION_MIN_SCORE: f64 = 0.5;

/// Picks the candidate column set best covered by `source_columns`.
///
/// A destination column counts as covered when any source column scores at
/// least `threshold` against it. The first candidate wins ties.
pub fn detect_table(
    source_columns: &[String],
    candidates: &[Vec<DestinationColumn>],
    strategy: &dyn SimilarityStrategy,
    threshold: f64,
) -> Option<TableDetection> {
    let source_keys: Vec<String> = source_columns.iter().map(|c| comparison_key(c)).collect();
    let mut best: Option<TableDetection> = None;
    for (index, columns) in candidates.iter().enumerate() {
        if columns.is_empty() {
            continue;
        }
        let covered = columns
            .iter()
            .filter(|column| {
                let key = comparison_key(&column.name);
                source_keys
                    .iter()
                    .any(|candidate| strategy.score(candidate, &key) >= threshold)
            })
            .count();
        let score = covered as f64 / columns.len() as f64;
        if best.as_ref().is_none_or(|current| score > current.score) {
            best = Some(TableDetection { index, score });
        }
    }
    best.filter(|detection| detection.score >= DETECTION_MIN_SCORE)
}
