//! Destination schema lookup.
//!
//! Column metadata comes from the engine's own catalog views rather than
//! `INFORMATION_SCHEMA`, so a three-part name never resolves against the
//! wrong database. Character lengths are converted from the driver's byte
//! counts to characters.

use log::debug;

use crate::{
    destination::{Connection, RawColumn, Statement},
    error::{DriverErrorKind, SchemaLookupError},
    schema::{DestinationColumn, SqlType, TypeFamily},
    table_name::TableName,
};

pub fn get_columns<C>(
    conn: &mut C,
    table: &TableName,
) -> Result<Vec<DestinationColumn>, SchemaLookupError>
where
    C: Connection + ?Sized,
{
    let statement = Statement::ColumnMetadata {
        table: table.clone(),
    };
    debug!("{}", statement.to_sql());
    let raw = conn.query_columns(&statement).map_err(|err| match err.kind {
        DriverErrorKind::PermissionDenied => SchemaLookupError::AccessDenied {
            table: table.to_string(),
            source: err,
        },
        DriverErrorKind::ObjectNotFound => SchemaLookupError::NotFound {
            table: table.to_string(),
        },
        _ => SchemaLookupError::Query {
            table: table.to_string(),
            source: err,
        },
    })?;
    if raw.is_empty() {
        return Err(SchemaLookupError::NotFound {
            table: table.to_string(),
        });
    }
    Ok(raw.into_iter().map(describe_column).collect())
}

pub fn describe_column(raw: RawColumn) -> DestinationColumn {
    let type_name = raw.type_name.trim().to_ascii_lowercase();
    let family = TypeFamily::from_sql_type(&type_name);
    let column = DestinationColumn::new(raw.name, family).with_sql_type(type_name.as_str());
    match char_length(&type_name, raw.max_length) {
        Some(length) => column.with_max_char_length(length),
        None => column,
    }
}

fn char_length(type_name: &str, max_length: Option<i32>) -> Option<usize> {
    let sql_type = SqlType {
        name: type_name.to_string(),
        length: None,
    };
    if !sql_type.is_character() || matches!(type_name, "text" | "ntext") {
        return None;
    }
    let bytes = usize::try_from(max_length?).ok().filter(|b| *b > 0)?;
    if sql_type.is_double_byte() {
        Some(bytes / 2)
    } else {
        Some(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;

    fn raw(name: &str, type_name: &str, max_length: Option<i32>) -> RawColumn {
        RawColumn {
            name: name.to_string(),
            type_name: type_name.to_string(),
            max_length,
        }
    }

    #[test]
    fn halves_double_byte_lengths() {
        let column = describe_column(raw("Name", "nvarchar", Some(100)));
        assert_eq!(column.type_family, TypeFamily::String);
        assert_eq!(column.max_char_length, Some(50));

        let single = describe_column(raw("Code", "VARCHAR", Some(10)));
        assert_eq!(single.max_char_length, Some(10));
        assert_eq!(single.sql_type, "varchar");
    }

    #[test]
    fn unbounded_and_non_character_columns_report_no_length() {
        assert_eq!(
            describe_column(raw("Notes", "nvarchar", Some(-1))).max_char_length,
            None
        );
        assert_eq!(
            describe_column(raw("Legacy", "ntext", Some(16))).max_char_length,
            None
        );
        let id = describe_column(raw("PatientId", "int", Some(4)));
        assert_eq!(id.type_family, TypeFamily::Integer);
        assert_eq!(id.max_char_length, None);
    }

    struct Denied;

    impl Connection for Denied {
        fn query_columns(&mut self, _: &Statement) -> Result<Vec<RawColumn>, DriverError> {
            Err(DriverError::new(
                DriverErrorKind::PermissionDenied,
                "VIEW DEFINITION denied",
            ))
        }
        fn execute(&mut self, _: &Statement) -> Result<u64, DriverError> {
            unreachable!()
        }
        fn execute_many(
            &mut self,
            _: &Statement,
            _: &[Vec<Option<crate::data::Value>>],
        ) -> Result<u64, DriverError> {
            unreachable!()
        }
        fn commit(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
        fn rollback(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    #[test]
    fn denied_metadata_is_a_lookup_error() {
        let err = get_columns(&mut Denied, &TableName::new("dbo", "Secret")).unwrap_err();
        assert!(matches!(err, SchemaLookupError::AccessDenied { .. }));
    }
}
