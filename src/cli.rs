use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    loader::{DEFAULT_BATCH_SIZE, UploadMode},
    similarity::{DEFAULT_DETECT_THRESHOLD, DEFAULT_MATCH_THRESHOLD, SimilarityKind},
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reconcile spreadsheet exports with a SQL Server table and bulk load them",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show how a file's columns map onto a destination table
    Check(CheckArgs),
    /// Write a file reshaped and typed for its destination table
    Clean(CleanArgs),
    /// Bulk load a file into a catalog-backed destination table
    Load(LoadArgs),
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Input file: CSV/TSV, or an .xlsx/.xlsm/.xlsb/.xls/.ods workbook
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// YAML catalog describing the destination tables
    #[arg(short = 'c', long = "catalog")]
    pub catalog: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Worksheet to read from a workbook input (defaults to the first sheet)
    #[arg(long)]
    pub sheet: Option<String>,
}

#[derive(Debug, Args)]
pub struct MatchArgs {
    /// Minimum similarity for a fuzzy column match (inclusive)
    #[arg(long, default_value_t = DEFAULT_MATCH_THRESHOLD)]
    pub threshold: f64,
    /// Similarity measure used for fuzzy matching
    #[arg(long, value_enum, default_value_t = SimilarityKind::Lcs)]
    pub similarity: SimilarityKind,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub matching: MatchArgs,
    /// Destination table as `[database.]schema.table`; detected when omitted
    #[arg(short = 't', long = "table")]
    pub table: Option<String>,
    /// Minimum similarity used when detecting the destination table
    #[arg(long = "detect-threshold", default_value_t = DEFAULT_DETECT_THRESHOLD)]
    pub detect_threshold: f64,
    /// Rows to scan for data-quality notes (0 means full scan)
    #[arg(long, default_value_t = 0)]
    pub sample_rows: usize,
    /// Emit the report as JSON
    #[arg(long)]
    pub json: bool,
    /// Exit with an error when columns are missing or unmatched
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct CleanArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub matching: MatchArgs,
    /// Destination table as `[database.]schema.table`
    #[arg(short = 't', long = "table")]
    pub table: String,
    /// Output CSV file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Delimiter to use for output (defaults to the input's delimiter)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub matching: MatchArgs,
    /// Destination table as `[database.]schema.table`
    #[arg(short = 't', long = "table")]
    pub table: String,
    /// append, delete (alias replace), or the deprecated truncate
    #[arg(short = 'm', long = "mode", default_value = "append")]
    pub mode: UploadMode,
    /// Rows per committed batch
    #[arg(long = "batch-size", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    /// Export the destination table after loading
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Print the upload result as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_defaults() {
        let cli = Cli::parse_from([
            "sheet-loader",
            "load",
            "-i",
            "in.csv",
            "-c",
            "catalog.yml",
            "-t",
            "dbo.Patients",
        ]);
        let Commands::Load(args) = cli.command else {
            panic!("expected load");
        };
        assert_eq!(args.mode, UploadMode::Append);
        assert_eq!(args.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(args.matching.threshold, DEFAULT_MATCH_THRESHOLD);
        assert_eq!(args.matching.similarity, SimilarityKind::Lcs);
    }

    #[test]
    fn mode_accepts_delete_alias() {
        let cli = Cli::parse_from([
            "sheet-loader",
            "load",
            "-i",
            "in.csv",
            "-c",
            "c.yml",
            "-t",
            "T",
            "--mode",
            "replace",
            "--similarity",
            "jaro-winkler",
            "--delimiter",
            "tab",
        ]);
        let Commands::Load(args) = cli.command else {
            panic!("expected load");
        };
        assert_eq!(args.mode, UploadMode::Replace);
        assert_eq!(args.matching.similarity, SimilarityKind::JaroWinkler);
        assert_eq!(args.source.delimiter, Some(b'\t'));
    }
}
