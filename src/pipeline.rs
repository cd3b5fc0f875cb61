//! Per-upload row pipeline: project a source row into destination order,
//! then coerce each cell. The mapping is computed once and reused for every
//! row of the upload.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
    coerce::{CoercionStats, ColumnCoercionStats, TypeCoercer},
    data::{RawValue, Value},
    reconcile::{ColumnMapping, FuzzyMatch, ReconciliationDiagnostics, SchemaReconciler},
    schema::DestinationColumn,
};

pub struct Pipeline {
    mapping: ColumnMapping,
    reconciliation: ReconciliationDiagnostics,
    coercer: TypeCoercer,
}

impl Pipeline {
    pub fn new(
        reconciler: &SchemaReconciler,
        source_columns: &[String],
        destination: &[DestinationColumn],
    ) -> Self {
        let (mapping, reconciliation) = reconciler.match_columns(source_columns, destination);
        let coercer = TypeCoercer::new(mapping.destination_columns());
        Self {
            mapping,
            reconciliation,
            coercer,
        }
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn reconciliation(&self) -> &ReconciliationDiagnostics {
        &self.reconciliation
    }

    pub fn apply(&mut self, row: &[RawValue]) -> Vec<Option<Value>> {
        let projected = self.mapping.project(row);
        self.coercer.coerce_row(&projected)
    }

    pub fn stats(&self) -> &CoercionStats {
        self.coercer.stats()
    }

    pub fn diagnostics(&self) -> UploadDiagnostics {
        UploadDiagnostics::new(&self.reconciliation, self.coercer.stats())
    }
}

/// Everything an upload noticed about its input, whatever the outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadDiagnostics {
    pub missing_columns: Vec<String>,
    pub extra_columns: Vec<String>,
    pub fuzzy_matches: Vec<FuzzyMatch>,
    pub truncated_value_count: usize,
    pub degraded_value_count: usize,
    pub columns: Vec<ColumnCoercionStats>,
}

impl UploadDiagnostics {
    pub fn new(reconciliation: &ReconciliationDiagnostics, stats: &CoercionStats) -> Self {
        Self {
            missing_columns: reconciliation.missing_column_names(),
            extra_columns: reconciliation.extra_columns.clone(),
            fuzzy_matches: reconciliation.fuzzy_matches.clone(),
            truncated_value_count: stats.truncated_total(),
            degraded_value_count: stats.degraded_total(),
            columns: stats.columns.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Serializing upload diagnostics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeFamily;

    #[test]
    fn applies_mapping_then_coercion() {
        let destination = vec![
            DestinationColumn::new("PatientId", TypeFamily::Integer),
            DestinationColumn::new("Name", TypeFamily::String)
                .with_sql_type("varchar")
                .with_max_char_length(50),
        ];
        let mut pipeline = Pipeline::new(
            &SchemaReconciler::default(),
            &["Patient ID".to_string(), "FullName".to_string()],
            &destination,
        );
        let row = pipeline.apply(&[RawValue::from("7"), RawValue::from("A. Smith")]);
        assert_eq!(row, vec![Some(Value::Integer(7)), None]);

        let diagnostics = pipeline.diagnostics();
        assert_eq!(diagnostics.missing_columns, vec!["Name".to_string()]);
        assert_eq!(diagnostics.extra_columns, vec!["FullName".to_string()]);
        assert_eq!(diagnostics.fuzzy_matches.len(), 1);
        assert_eq!(diagnostics.degraded_value_count, 0);

        let json: serde_json::Value = serde_json::from_str(&diagnostics.to_json().unwrap()).unwrap();
        assert_eq!(json["missing_columns"][0], "Name");
        assert_eq!(json["truncated_value_count"], 0);
    }
}
