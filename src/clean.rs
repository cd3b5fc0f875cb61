use anyhow::{Context, Result};
use log::{info, warn};

use crate::{
    cli::CleanArgs,
    frame::RowSource,
    introspect, io_utils, open_inputs,
    pipeline::Pipeline,
    reconcile::SchemaReconciler,
    report,
    table_name::TableName,
};

/// Writes the input reshaped to the destination: columns renamed and
/// ordered as the table declares them, unmatched columns dropped, missing
/// ones left empty, and every value coerced as an upload would.
pub fn execute(args: &CleanArgs) -> Result<()> {
    let (source, mut conn) = open_inputs(&args.source)?;
    let table = TableName::parse(&args.table)?;
    let destination = introspect::get_columns(&mut conn, &table)
        .with_context(|| format!("Reading columns of {table}"))?;
    let reconciler =
        SchemaReconciler::new(args.matching.similarity.strategy(), args.matching.threshold);
    let mut pipeline = Pipeline::new(&reconciler, source.columns(), &destination);

    let delimiter = args
        .output_delimiter
        .or(source.delimiter())
        .unwrap_or_else(|| io_utils::delimiter_for(&args.output, None));
    let mut writer = io_utils::create_csv_writer(&args.output, delimiter)?;
    writer
        .write_record(pipeline.mapping().destination_names())
        .context("Writing output headers")?;

    let mut written = 0usize;
    for (idx, row) in source
        .rows()
        .with_context(|| format!("Reading {:?}", args.source.input))?
        .enumerate()
    {
        let row = row.with_context(|| format!("Reading row {}", idx + 2))?;
        let cleaned = pipeline.apply(&row);
        writer
            .write_record(
                cleaned
                    .iter()
                    .map(|value| value.as_ref().map(|v| v.as_display()).unwrap_or_default()),
            )
            .with_context(|| format!("Writing row {}", idx + 2))?;
        written += 1;
    }
    writer.flush().context("Flushing output")?;

    let diagnostics = pipeline.diagnostics();
    if !diagnostics.missing_columns.is_empty() {
        warn!(
            "Columns left empty: {}",
            diagnostics.missing_columns.join(", ")
        );
    }
    if !diagnostics.extra_columns.is_empty() {
        warn!("Columns dropped: {}", diagnostics.extra_columns.join(", "));
    }
    let (headers, rows) = report::coercion_rows(&pipeline.stats().columns);
    if !rows.is_empty() {
        eprint!("{}", report::render_table(&headers, &rows));
    }
    info!(
        "Wrote {} row(s) for {} ({} truncated, {} nulled)",
        written, table, diagnostics.truncated_value_count, diagnostics.degraded_value_count
    );
    Ok(())
}
