use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use serde::Serialize;

use crate::{
    cli::CheckArgs,
    destination::Connection,
    frame::RowSource,
    introspect,
    memory::MemoryConnection,
    open_inputs,
    quality::{self, QualityReport},
    reconcile::{ColumnMapping, ReconciliationDiagnostics, SchemaReconciler, detect_table},
    report,
    schema::DestinationColumn,
    table_name::TableName,
};

#[derive(Debug, Serialize)]
struct CheckReport {
    table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detection_score: Option<f64>,
    mapping: ColumnMapping,
    diagnostics: ReconciliationDiagnostics,
    quality: QualityReport,
}

pub fn execute(args: &CheckArgs) -> Result<()> {
    let (source, mut conn) = open_inputs(&args.source)?;
    let reconciler =
        SchemaReconciler::new(args.matching.similarity.strategy(), args.matching.threshold);

    let (table, detection_score) = match &args.table {
        Some(table) => (TableName::parse(table)?, None),
        None => {
            let (table, score) =
                detect_target(&mut conn, source.columns(), &reconciler, args.detect_threshold)?;
            info!("Detected destination {table} (coverage {score:.2})");
            (table, Some(score))
        }
    };
    let destination = introspect::get_columns(&mut conn, &table)
        .with_context(|| format!("Reading columns of {table}"))?;
    let (mapping, diagnostics) = reconciler.match_columns(source.columns(), &destination);

    let limit = (args.sample_rows > 0).then_some(args.sample_rows);
    let quality = quality::assess(&source, limit)
        .with_context(|| format!("Scanning {:?}", args.source.input))?;

    let check = CheckReport {
        table: table.to_string(),
        detection_score,
        mapping,
        diagnostics,
        quality,
    };
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&check).context("Serializing check report")?
        );
    } else {
        print_report(&check);
    }

    if args.strict && check.diagnostics.has_warnings() {
        return Err(anyhow!(
            "{} missing and {} unmatched column(s) for {}",
            check.diagnostics.missing_columns.len(),
            check.diagnostics.extra_columns.len(),
            check.table
        ));
    }
    Ok(())
}

fn detect_target(
    conn: &mut MemoryConnection,
    source_columns: &[String],
    reconciler: &SchemaReconciler,
    threshold: f64,
) -> Result<(TableName, f64)> {
    let tables = conn.tables();
    let candidates = tables
        .iter()
        .map(|t| lookup(&mut *conn, t))
        .collect::<Result<Vec<_>>>()?;
    let detection = detect_table(source_columns, &candidates, reconciler.strategy(), threshold)
        .ok_or_else(|| {
            anyhow!("No catalog table matches the input columns closely enough; pass --table")
        })?;
    Ok((tables[detection.index].clone(), detection.score))
}

fn lookup<C: Connection + ?Sized>(
    conn: &mut C,
    table: &TableName,
) -> Result<Vec<DestinationColumn>> {
    introspect::get_columns(conn, table).with_context(|| format!("Reading columns of {table}"))
}

fn print_report(check: &CheckReport) {
    println!("Destination: {}", check.table);
    let (headers, rows) = report::mapping_rows(&check.mapping);
    report::print_table(&headers, &rows);

    let diagnostics = &check.diagnostics;
    if !diagnostics.missing_columns.is_empty() {
        let names = diagnostics.missing_column_names().join(", ");
        warn!("Missing columns: {names}");
        println!("Missing columns (loaded as null): {names}");
    }
    if !diagnostics.extra_columns.is_empty() {
        let names = diagnostics.extra_columns.join(", ");
        warn!("Unmatched source columns: {names}");
        println!("Unmatched source columns (dropped): {names}");
    }
    if check.quality.is_clean() {
        println!(
            "No data-quality issues in {} row(s)",
            check.quality.rows_scanned
        );
    } else {
        for note in check.quality.notes() {
            println!("Data quality: {note}");
        }
    }
}
