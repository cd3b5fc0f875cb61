//! The live destination handle and the statements the engine issues.
//!
//! Connection establishment is someone else's job: callers hand the loader
//! anything implementing [`Connection`]. Every [`Statement`] renders the
//! T-SQL an ODBC-style driver adapter would execute.

use itertools::Itertools;

use crate::{
    data::Value,
    error::DriverError,
    table_name::{TableName, quote_identifier},
};

/// Insert parameters for one row, in statement column order.
pub type Row = Vec<Option<Value>>;

/// One row of the column metadata query, as the driver reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,
    pub type_name: String,
    /// Byte length from `sys.columns.max_length`; `-1` means `max`.
    pub max_length: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    ColumnMetadata { table: TableName },
    DeleteAll { table: TableName },
    Truncate { table: TableName },
    Insert { table: TableName, columns: Vec<String> },
}

impl Statement {
    pub fn table(&self) -> &TableName {
        match self {
            Statement::ColumnMetadata { table }
            | Statement::DeleteAll { table }
            | Statement::Truncate { table }
            | Statement::Insert { table, .. } => table,
        }
    }

    pub fn to_sql(&self) -> String {
        match self {
            Statement::ColumnMetadata { table } => {
                let prefix = table.catalog_prefix();
                format!(
                    "SELECT c.name AS column_name, t.name AS type_name, c.max_length \
                     FROM {prefix}sys.columns AS c \
                     JOIN {prefix}sys.types AS t ON t.user_type_id = c.user_type_id \
                     JOIN {prefix}sys.objects AS o ON o.object_id = c.object_id \
                     JOIN {prefix}sys.schemas AS s ON s.schema_id = o.schema_id \
                     WHERE s.name = {schema} AND o.name = {name} AND o.type IN ('U', 'V') \
                     ORDER BY c.column_id",
                    schema = string_literal(&table.schema),
                    name = string_literal(&table.table),
                )
            }
            Statement::DeleteAll { table } => format!("DELETE FROM {}", table.quoted()),
            Statement::Truncate { table } => format!("TRUNCATE TABLE {}", table.quoted()),
            Statement::Insert { table, columns } => format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table.quoted(),
                columns.iter().map(|c| quote_identifier(c)).join(", "),
                columns.iter().map(|_| "?").join(", ")
            ),
        }
    }
}

fn string_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// A live, exclusively owned destination connection running in manual
/// commit mode.
pub trait Connection {
    fn query_columns(&mut self, statement: &Statement) -> Result<Vec<RawColumn>, DriverError>;

    fn execute(&mut self, statement: &Statement) -> Result<u64, DriverError>;

    /// Executes a parameterised statement once per row, in one round trip.
    fn execute_many(
        &mut self,
        statement: &Statement,
        rows: &[Row],
    ) -> Result<u64, DriverError>;

    fn commit(&mut self) -> Result<(), DriverError>;

    fn rollback(&mut self) -> Result<(), DriverError>;
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn query_columns(&mut self, statement: &Statement) -> Result<Vec<RawColumn>, DriverError> {
        (**self).query_columns(statement)
    }

    fn execute(&mut self, statement: &Statement) -> Result<u64, DriverError> {
        (**self).execute(statement)
    }

    fn execute_many(
        &mut self,
        statement: &Statement,
        rows: &[Row],
    ) -> Result<u64, DriverError> {
        (**self).execute_many(statement, rows)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        (**self).rollback()
    }
}
