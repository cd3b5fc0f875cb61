pub mod check;
pub mod clean;
pub mod cli;
pub mod coerce;
pub mod csv_source;
pub mod data;
pub mod destination;
pub mod error;
pub mod frame;
pub mod input;
pub mod introspect;
pub mod io_utils;
pub mod load;
pub mod loader;
pub mod memory;
pub mod pipeline;
pub mod quality;
pub mod reconcile;
pub mod report;
pub mod schema;
pub mod similarity;
pub mod table_name;
pub mod workbook_source;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands, SourceArgs},
    frame::RowSource,
    input::InputFile,
    memory::{Catalog, MemoryConnection},
};

pub use crate::{
    destination::{Connection, Statement},
    error::{LoadError, UploadError},
    loader::{BulkLoader, LoadOptions, UploadMode, UploadResult},
    reconcile::SchemaReconciler,
    table_name::TableName,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_loader", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Check(args) => check::execute(&args),
        Commands::Clean(args) => clean::execute(&args),
        Commands::Load(args) => load::execute(&args),
    }
}

/// Opens the input file and a destination seeded from the catalog.
pub(crate) fn open_inputs(args: &SourceArgs) -> Result<(InputFile, MemoryConnection)> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let source = InputFile::open(&args.input, args.delimiter, encoding, args.sheet.as_deref())
        .with_context(|| format!("Opening input {:?}", args.input))?;
    info!(
        "Reading '{}' with {} ({} column(s))",
        args.input.display(),
        source.describe(),
        source.columns().len()
    );
    let catalog = Catalog::load(&args.catalog)
        .with_context(|| format!("Loading catalog from {:?}", args.catalog))?;
    let conn = MemoryConnection::from_catalog(&catalog)
        .with_context(|| format!("Building destination from {:?}", args.catalog))?;
    Ok((source, conn))
}
