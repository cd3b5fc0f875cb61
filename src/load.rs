use std::path::Path;

use anyhow::{Context, Result, anyhow};
use log::info;

use crate::{
    cli::LoadArgs,
    io_utils,
    loader::{BulkLoader, LoadOptions, UploadResult},
    memory::MemoryConnection,
    open_inputs, report,
    table_name::TableName,
};

pub fn execute(args: &LoadArgs) -> Result<()> {
    let (source, mut conn) = open_inputs(&args.source)?;
    let options = LoadOptions {
        batch_size: args.batch_size,
        match_threshold: args.matching.threshold,
        similarity: args.matching.similarity,
    };
    let result = {
        let mut loader = BulkLoader::new(&mut conn, options)?;
        loader
            .upload(&args.table, &source, args.mode)
            .with_context(|| format!("Loading {:?} into {}", args.source.input, args.table))?
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Serializing upload result")?
        );
    } else {
        print_result(&result);
    }

    if let Some(path) = &args.output {
        let table = TableName::parse(&args.table)?;
        export_table(&conn, &table, path)?;
        info!("Exported {} to {:?}", table, path);
    }

    match &result.terminal_error {
        Some(err) => Err(anyhow!(
            "upload stopped after {} committed batch(es): {err}",
            result.batches_committed
        )),
        None => Ok(()),
    }
}

fn print_result(result: &UploadResult) {
    println!(
        "Loaded {} row(s) into {} in {} batch(es) ({} mode)",
        result.rows_uploaded, result.table, result.batches_committed, result.mode
    );
    let diagnostics = &result.diagnostics;
    if !diagnostics.missing_columns.is_empty() {
        println!("Missing columns: {}", diagnostics.missing_columns.join(", "));
    }
    if !diagnostics.extra_columns.is_empty() {
        println!("Extra columns: {}", diagnostics.extra_columns.join(", "));
    }
    println!(
        "Truncated values: {}; nulled values: {}",
        diagnostics.truncated_value_count, diagnostics.degraded_value_count
    );
    let (headers, rows) = report::coercion_rows(&diagnostics.columns);
    if !rows.is_empty() {
        report::print_table(&headers, &rows);
    }
}

fn export_table(conn: &MemoryConnection, table: &TableName, path: &Path) -> Result<()> {
    let columns = conn
        .columns(table)
        .ok_or_else(|| anyhow!("Table {table} is not in the catalog"))?;
    let rows = conn.rows(table).unwrap_or_default();
    let mut writer = io_utils::create_csv_writer(path, io_utils::delimiter_for(path, None))?;
    writer
        .write_record(columns.iter().map(|c| c.name.as_str()))
        .context("Writing export headers")?;
    for row in rows {
        writer
            .write_record(
                row.iter()
                    .map(|value| value.as_ref().map(|v| v.as_display()).unwrap_or_default()),
            )
            .context("Writing exported row")?;
    }
    writer.flush().context("Flushing export")?;
    Ok(())
}
