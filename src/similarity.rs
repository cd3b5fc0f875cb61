//! Pluggable string similarity used by fuzzy column matching.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use similar::{Algorithm, DiffOp, capture_diff_slices};

/// Minimum score for claiming a source column under a destination name.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.85;
/// Looser score used when guessing which table a file belongs to.
pub const DEFAULT_DETECT_THRESHOLD: f64 = 0.65;

pub trait SimilarityStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Score in `[0, 1]`; 1 means identical.
    fn score(&self, left: &str, right: &str) -> f64;
}

/// `2 * LCS / (len(left) + len(right))` over characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct LcsRatio;

impl SimilarityStrategy for LcsRatio {
    fn name(&self) -> &'static str {
        "lcs"
    }

    fn score(&self, left: &str, right: &str) -> f64 {
        let left: Vec<char> = left.chars().collect();
        let right: Vec<char> = right.chars().collect();
        let total = left.len() + right.len();
        if total == 0 {
            return 1.0;
        }
        let matched: usize = capture_diff_slices(Algorithm::Myers, &left, &right)
            .iter()
            .map(|op| match op {
                DiffOp::Equal { len, .. } => *len,
                _ => 0,
            })
            .sum();
        (2 * matched) as f64 / total as f64
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinkler;

impl SimilarityStrategy for JaroWinkler {
    fn name(&self) -> &'static str {
        "jaro-winkler"
    }

    fn score(&self, left: &str, right: &str) -> f64 {
        strsim::jaro_winkler(left, right)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum SimilarityKind {
    #[default]
    Lcs,
    JaroWinkler,
}

impl SimilarityKind {
    pub fn strategy(&self) -> Box<dyn SimilarityStrategy> {
        match self {
            SimilarityKind::Lcs => Box::new(LcsRatio),
            SimilarityKind::JaroWinkler => Box::new(JaroWinkler),
        }
    }
}

impl fmt::Display for SimilarityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.strategy().name())
    }
}
