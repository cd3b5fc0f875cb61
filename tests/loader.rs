mod common;

use chrono::NaiveDate;
use sheet_loader::{
    csv_source::CsvSource,
    data::{RawValue, Value},
    error::{DriverError, DriverErrorKind, LoadError, SchemaLookupError, UploadError},
    frame::SourceFrame,
    loader::{BulkLoader, LoadOptions, UploadMode, UploadState},
    memory::MemoryConnection,
    reconcile::SchemaReconciler,
    similarity::JaroWinkler,
    table_name::TableName,
    workbook_source::WorkbookSource,
};

use common::{TestWorkspace, destination};

const PATIENTS: &str = r#"
tables:
  - name: dbo.Patients
    columns:
      - { name: PatientId, type: int }
      - { name: Name, type: varchar(50) }
"#;

fn patients() -> TableName {
    TableName::new("dbo", "Patients")
}

fn options(batch_size: usize) -> LoadOptions {
    LoadOptions {
        batch_size,
        ..LoadOptions::default()
    }
}

fn numbered_frame(count: i64) -> SourceFrame {
    SourceFrame::new(
        vec!["PatientId".into(), "Name".into()],
        (1..=count)
            .map(|i| vec![RawValue::from(i), RawValue::from(format!("Patient {i}"))])
            .collect(),
    )
    .expect("frame")
}

fn ids(conn: &MemoryConnection) -> Vec<i64> {
    conn.rows(&patients())
        .unwrap_or_default()
        .iter()
        .map(|row| match &row[0] {
            Some(Value::Integer(id)) => *id,
            other => panic!("unexpected id {other:?}"),
        })
        .collect()
}

#[test]
fn drifted_headers_load_by_similarity() {
    let mut conn = destination(PATIENTS);
    let frame = SourceFrame::from_records(vec![vec![
        ("Patient ID", RawValue::from("7")),
        ("FullName", RawValue::from("A. Smith")),
    ]]);

    let result = BulkLoader::new(&mut conn, LoadOptions::default())
        .unwrap()
        .upload("dbo.Patients", &frame, UploadMode::Append)
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.rows_uploaded, 1);
    assert_eq!(result.batches_committed, 1);
    assert_eq!(result.diagnostics.missing_columns, vec!["Name".to_string()]);
    assert_eq!(result.diagnostics.extra_columns, vec!["FullName".to_string()]);
    assert_eq!(
        conn.rows(&patients()).unwrap(),
        [vec![Some(Value::Integer(7)), None]]
    );
}

#[test]
fn custom_reconciler_changes_which_headers_match() {
    let frame = SourceFrame::from_records(vec![vec![
        ("patient_identifier", RawValue::from("42")),
        ("Name", RawValue::from("Ada")),
    ]]);

    let mut conn = destination(PATIENTS);
    let lcs = BulkLoader::new(&mut conn, LoadOptions::default())
        .unwrap()
        .upload("dbo.Patients", &frame, UploadMode::Append)
        .unwrap();
    assert_eq!(lcs.diagnostics.missing_columns, vec!["PatientId".to_string()]);

    let mut conn = destination(PATIENTS);
    let result = BulkLoader::new(&mut conn, LoadOptions::default())
        .unwrap()
        .with_reconciler(SchemaReconciler::new(Box::new(JaroWinkler), 0.85))
        .upload("dbo.Patients", &frame, UploadMode::Append)
        .unwrap();

    assert!(result.is_success());
    assert!(result.diagnostics.missing_columns.is_empty());
    assert_eq!(result.diagnostics.fuzzy_matches.len(), 1);
    assert_eq!(result.diagnostics.fuzzy_matches[0].source, "patient_identifier");
    assert_eq!(
        conn.rows(&patients()).unwrap(),
        [vec![
            Some(Value::Integer(42)),
            Some(Value::String("Ada".into()))
        ]]
    );
}

#[test]
fn append_accumulates_and_delete_replaces() {
    let frame = numbered_frame(3);

    let mut conn = destination(PATIENTS);
    for _ in 0..2 {
        BulkLoader::new(&mut conn, options(2))
            .unwrap()
            .upload("Patients", &frame, UploadMode::Append)
            .unwrap();
    }
    assert_eq!(conn.row_count(&patients()), 6);

    let mut conn = destination(PATIENTS);
    for _ in 0..2 {
        let result = BulkLoader::new(&mut conn, options(2))
            .unwrap()
            .upload("Patients", &frame, UploadMode::Replace)
            .unwrap();
        assert_eq!(result.batches_committed, 2);
    }
    assert_eq!(ids(&conn), vec![1, 2, 3]);
}

#[test]
fn failed_batch_keeps_earlier_batches_committed() {
    let mut conn = destination(PATIENTS).fail_insert_on(
        2,
        DriverError::new(DriverErrorKind::Connectivity, "TCP provider: connection reset"),
    );
    let frame = numbered_frame(6);

    let result = BulkLoader::new(&mut conn, options(2))
        .unwrap()
        .upload("dbo.Patients", &frame, UploadMode::Append)
        .unwrap();

    assert_eq!(result.batches_committed, 1);
    assert_eq!(result.rows_uploaded, 2);
    assert!(matches!(
        result.terminal_error,
        Some(UploadError::ConnectivityLoss { batch: 2, .. })
    ));
    assert_eq!(ids(&conn), vec![1, 2]);
    let inserts = conn
        .executed()
        .iter()
        .filter(|sql| sql.starts_with("INSERT"))
        .count();
    assert_eq!(inserts, 2);
}

#[test]
fn failed_commit_rolls_back_that_batch() {
    let mut conn = destination(PATIENTS).fail_commit_on(
        2,
        DriverError::new(DriverErrorKind::Other, "log full"),
    );
    let frame = numbered_frame(5);

    let result = BulkLoader::new(&mut conn, options(2))
        .unwrap()
        .upload("dbo.Patients", &frame, UploadMode::Append)
        .unwrap();

    assert_eq!(result.batches_committed, 1);
    assert!(matches!(
        result.terminal_error,
        Some(UploadError::Other { batch: 2, .. })
    ));
    assert_eq!(ids(&conn), vec![1, 2]);
}

#[test]
fn destination_rejections_map_to_upload_errors() {
    let mut conn = destination(
        r#"
tables:
  - name: Codes
    columns:
      - { name: Code, type: int, nullable: false }
"#,
    );
    let frame = SourceFrame::new(
        vec!["Code".into()],
        vec![vec![RawValue::from("1")], vec![RawValue::from("")]],
    )
    .unwrap();

    let result = BulkLoader::new(&mut conn, options(1))
        .unwrap()
        .upload("Codes", &frame, UploadMode::Append)
        .unwrap();

    assert_eq!(result.batches_committed, 1);
    assert!(matches!(
        result.terminal_error,
        Some(UploadError::ConstraintViolation { batch: 2, .. })
    ));
    let json = serde_json::to_value(&result).unwrap();
    assert!(
        json["terminal_error"]
            .as_str()
            .unwrap()
            .starts_with("batch 2: constraint violation")
    );
}

#[test]
fn session_can_stop_between_commits() {
    let mut conn = destination(PATIENTS);
    let frame = numbered_frame(5);
    {
        let mut loader = BulkLoader::new(&mut conn, options(2)).unwrap();
        let mut session = loader
            .begin("dbo.Patients", &frame, UploadMode::Append)
            .unwrap();
        assert_eq!(session.state(), UploadState::Streaming { next_batch: 1 });

        let first = session.next_batch().unwrap().unwrap();
        assert_eq!((first.sequence, first.rows), (1, 2));
        assert_eq!(session.state(), UploadState::Streaming { next_batch: 2 });

        let result = session.finish();
        assert!(result.is_success());
        assert_eq!(result.batches_committed, 1);
    }
    assert_eq!(ids(&conn), vec![1, 2]);
}

#[test]
fn session_reaches_done_on_a_short_final_batch() {
    let mut conn = destination(PATIENTS);
    let frame = numbered_frame(3);
    let mut loader = BulkLoader::new(&mut conn, options(2)).unwrap();
    let mut session = loader.begin("Patients", &frame, UploadMode::Append).unwrap();
    while session.next_batch().is_some() {}
    assert_eq!(session.state(), UploadState::Done);
    assert_eq!(session.rows_uploaded(), 3);
}

#[test]
fn truncate_falls_back_to_delete_when_referenced() {
    let mut conn = common::clinic();
    let frame = SourceFrame::new(
        vec!["PatientId".into()],
        vec![vec![RawValue::from(1_i64)], vec![RawValue::from(2_i64)]],
    )
    .unwrap();
    let table = TableName::new("dbo", "Patients");

    for _ in 0..2 {
        let result = BulkLoader::new(&mut conn, LoadOptions::default())
            .unwrap()
            .upload("Clinic.dbo.Patients", &frame, UploadMode::Truncate)
            .unwrap();
        assert!(result.is_success());
    }
    assert_eq!(conn.row_count(&table), 2);
    assert!(
        conn.executed()
            .iter()
            .any(|sql| sql == "TRUNCATE TABLE [Clinic].[dbo].[Patients]")
    );
    assert!(
        conn.executed()
            .iter()
            .any(|sql| sql == "DELETE FROM [Clinic].[dbo].[Patients]")
    );
}

#[test]
fn truncate_without_references_skips_delete() {
    let mut conn = common::clinic();
    let frame = SourceFrame::new(
        vec!["VisitId".into()],
        vec![vec![RawValue::from(10_i64)]],
    )
    .unwrap();
    BulkLoader::new(&mut conn, LoadOptions::default())
        .unwrap()
        .upload("dbo.Visits", &frame, UploadMode::Truncate)
        .unwrap();
    assert!(
        !conn
            .executed()
            .iter()
            .any(|sql| sql.starts_with("DELETE"))
    );
    assert_eq!(conn.row_count(&TableName::new("dbo", "Visits")), 1);
}

#[test]
fn failed_clear_aborts_before_any_batch() {
    let mut conn = destination(PATIENTS);
    BulkLoader::new(&mut conn, LoadOptions::default())
        .unwrap()
        .upload("Patients", &numbered_frame(2), UploadMode::Append)
        .unwrap();

    let mut conn = conn.fail_delete(DriverError::new(
        DriverErrorKind::PermissionDenied,
        "DELETE permission denied",
    ));
    let err = BulkLoader::new(&mut conn, LoadOptions::default())
        .unwrap()
        .upload("Patients", &numbered_frame(5), UploadMode::Replace)
        .unwrap_err();
    assert!(matches!(err, LoadError::Clear { .. }));
    assert_eq!(ids(&conn), vec![1, 2]);
}

#[test]
fn setup_failures_are_load_errors() {
    let frame = numbered_frame(1);

    let mut conn = destination(PATIENTS);
    let err = BulkLoader::new(&mut conn, LoadOptions::default())
        .unwrap()
        .upload("a.b.c.d", &frame, UploadMode::Append)
        .unwrap_err();
    assert!(matches!(err, LoadError::NameParse(_)));

    let err = BulkLoader::new(&mut conn, LoadOptions::default())
        .unwrap()
        .upload("dbo.Missing", &frame, UploadMode::Append)
        .unwrap_err();
    assert!(matches!(
        err,
        LoadError::SchemaLookup(SchemaLookupError::NotFound { .. })
    ));

    let mut denied = destination(PATIENTS).deny_metadata();
    let err = BulkLoader::new(&mut denied, LoadOptions::default())
        .unwrap()
        .upload("dbo.Patients", &frame, UploadMode::Append)
        .unwrap_err();
    assert!(matches!(
        err,
        LoadError::SchemaLookup(SchemaLookupError::AccessDenied { .. })
    ));

    assert!(matches!(
        BulkLoader::new(&mut conn, options(0)),
        Err(LoadError::Options(_))
    ));
}

#[test]
fn long_strings_are_cut_to_the_column_width() {
    let mut conn = destination(PATIENTS);
    let frame = SourceFrame::new(
        vec!["PatientId".into(), "Name".into()],
        vec![vec![RawValue::from("1"), RawValue::from("x".repeat(60))]],
    )
    .unwrap();

    let result = BulkLoader::new(&mut conn, LoadOptions::default())
        .unwrap()
        .upload("Patients", &frame, UploadMode::Append)
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.diagnostics.truncated_value_count, 1);
    let rows = conn.rows(&patients()).unwrap();
    assert_eq!(rows[0][1], Some(Value::String("x".repeat(50))));
}

#[test]
fn out_of_range_dates_become_null() {
    let mut conn = destination(
        r#"
tables:
  - name: Events
    columns:
      - { name: Id, type: int }
      - { name: Born, type: date }
      - { name: Seen, type: datetime }
"#,
    );
    let frame = SourceFrame::new(
        vec!["Id".into(), "Born".into(), "Seen".into()],
        vec![
            vec!["1".into(), "0000-12-31".into(), "1753-01-01 00:00:00".into()],
            vec!["2".into(), "2020-01-01".into(), "1752-12-31 23:59:59".into()],
        ],
    )
    .unwrap();

    let result = BulkLoader::new(&mut conn, LoadOptions::default())
        .unwrap()
        .upload("Events", &frame, UploadMode::Append)
        .unwrap();

    assert_eq!(result.diagnostics.degraded_value_count, 2);
    let rows = conn.rows(&TableName::new("dbo", "Events")).unwrap();
    let floor = NaiveDate::from_ymd_opt(1753, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    assert_eq!(rows[0][1], None);
    assert_eq!(rows[0][2], Some(Value::DateTime(floor)));
    assert_eq!(
        rows[1][1],
        Some(Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()))
    );
    assert_eq!(rows[1][2], None);
}

#[test]
fn unreadable_source_rows_stop_the_upload() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "ragged.csv",
        "PatientId,Name\n1,Ada\n2,Grace\n3,Alan,extra\n4,Edsger\n",
    );
    let source = CsvSource::open(&path, None, encoding_rs::UTF_8).unwrap();
    let mut conn = destination(PATIENTS);

    let result = BulkLoader::new(&mut conn, options(2))
        .unwrap()
        .upload("Patients", &source, UploadMode::Append)
        .unwrap();

    assert_eq!(result.batches_committed, 1);
    assert!(matches!(
        result.terminal_error,
        Some(UploadError::SourceRead { batch: 2, .. })
    ));
    assert_eq!(ids(&conn), vec![1, 2]);
}

#[test]
fn empty_source_in_delete_mode_empties_the_table() {
    let mut conn = destination(PATIENTS);
    BulkLoader::new(&mut conn, LoadOptions::default())
        .unwrap()
        .upload("Patients", &numbered_frame(3), UploadMode::Append)
        .unwrap();

    let empty = SourceFrame::new(vec!["PatientId".into(), "Name".into()], Vec::new()).unwrap();
    let result = BulkLoader::new(&mut conn, LoadOptions::default())
        .unwrap()
        .upload("Patients", &empty, UploadMode::Replace)
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.batches_committed, 0);
    assert_eq!(conn.row_count(&patients()), 0);
}

#[test]
fn workbook_cells_load_with_their_stored_types() {
    let source = WorkbookSource::open(&common::fixture_path("patients.xlsx"), None).unwrap();
    let mut conn = common::clinic();

    let result = BulkLoader::new(&mut conn, options(2))
        .unwrap()
        .upload("dbo.Patients", &source, UploadMode::Append)
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.rows_uploaded, 3);
    assert_eq!(result.batches_committed, 2);
    assert_eq!(result.diagnostics.missing_columns, vec!["Name".to_string()]);

    let date = |y, m, d| Some(Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap()));
    assert_eq!(
        conn.rows(&patients()).unwrap(),
        [
            vec![Some(Value::Integer(1)), None, date(1990, 5, 17), Some(Value::Boolean(true))],
            vec![Some(Value::Integer(2)), None, date(1906, 12, 9), Some(Value::Boolean(false))],
            vec![Some(Value::Integer(3)), None, None, Some(Value::Boolean(false))],
        ]
    );
}
