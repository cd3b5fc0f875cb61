//! An in-process destination that behaves like a small SQL Server database.
//!
//! Tables are declared by a [`Catalog`] (usually YAML). The connection keeps
//! manual-commit semantics: writes are visible to the session immediately
//! and survive only once committed. Inserts enforce declared widths, types,
//! and nullability the way the server would, and a table referenced by a
//! foreign key refuses `TRUNCATE`. Faults can be injected per call for tests.

use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, anyhow};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    data::Value,
    destination::{Connection, RawColumn, Row, Statement},
    error::{DriverError, DriverErrorKind},
    schema::{SqlType, TypeFamily},
    table_name::TableName,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub tables: Vec<CatalogTable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogTable {
    /// `schema.table` or a bare table name in `dbo`.
    pub name: String,
    pub columns: Vec<CatalogColumn>,
    /// Tables holding a foreign key to this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referenced_by: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening catalog file {path:?}"))?;
        let reader = BufReader::new(file);
        let catalog: Catalog = serde_yaml::from_reader(reader).context("Parsing catalog YAML")?;
        Ok(catalog)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Parsing catalog YAML")
    }

    pub fn table_names(&self) -> Result<Vec<TableName>> {
        self.tables
            .iter()
            .map(|t| -> Result<TableName> {
                let name = TableName::parse(&t.name)
                    .with_context(|| format!("Parsing catalog table name '{}'", t.name))?;
                Ok(match &self.database {
                    Some(db) if name.database.is_none() => name.with_database(db.clone()),
                    _ => name,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryColumn {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    name: TableName,
    columns: Vec<MemoryColumn>,
    referenced_by: Vec<String>,
    rows: Vec<Row>,
}

#[derive(Debug, Clone, Default)]
struct Faults {
    insert: Option<(usize, DriverError)>,
    commit: Option<(usize, DriverError)>,
    delete: Option<DriverError>,
    deny_metadata: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryConnection {
    database: Option<String>,
    tables: HashMap<String, MemoryTable>,
    order: Vec<String>,
    /// Committed row sets, captured at the first write of a transaction.
    snapshot: Option<HashMap<String, Vec<Row>>>,
    faults: Faults,
    insert_calls: usize,
    commit_calls: usize,
    executed: Vec<String>,
}

fn table_key(schema: &str, table: &str) -> String {
    format!("{}.{}", schema.to_lowercase(), table.to_lowercase())
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_catalog(catalog: &Catalog) -> Result<Self> {
        let mut conn = Self {
            database: catalog.database.clone(),
            ..Self::default()
        };
        let names = catalog.table_names()?;
        for (table, name) in catalog.tables.iter().zip(names) {
            let columns = table
                .columns
                .iter()
                .map(|c| -> Result<MemoryColumn> {
                    let sql_type = c.sql_type.parse::<SqlType>().with_context(|| {
                        format!("Column '{}' of table '{}'", c.name, table.name)
                    })?;
                    Ok(MemoryColumn {
                        name: c.name.clone(),
                        sql_type,
                        nullable: c.nullable,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            conn.add_table(name, columns, table.referenced_by.clone())?;
        }
        Ok(conn)
    }

    pub fn add_table(
        &mut self,
        name: TableName,
        columns: Vec<MemoryColumn>,
        referenced_by: Vec<String>,
    ) -> Result<()> {
        let key = table_key(&name.schema, &name.table);
        if self.tables.contains_key(&key) {
            return Err(anyhow!("Table {name} is declared more than once"));
        }
        if columns.is_empty() {
            return Err(anyhow!("Table {name} declares no columns"));
        }
        self.order.push(key.clone());
        self.tables.insert(
            key,
            MemoryTable {
                name,
                columns,
                referenced_by,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    /// Fails the `call`-th `execute_many` (1-based) with `error`.
    pub fn fail_insert_on(mut self, call: usize, error: DriverError) -> Self {
        self.faults.insert = Some((call, error));
        self
    }

    /// Fails the `call`-th commit (1-based) with `error`.
    pub fn fail_commit_on(mut self, call: usize, error: DriverError) -> Self {
        self.faults.commit = Some((call, error));
        self
    }

    pub fn fail_delete(mut self, error: DriverError) -> Self {
        self.faults.delete = Some(error);
        self
    }

    pub fn deny_metadata(mut self) -> Self {
        self.faults.deny_metadata = true;
        self
    }

    pub fn tables(&self) -> Vec<TableName> {
        self.order
            .iter()
            .filter_map(|key| self.tables.get(key))
            .map(|t| t.name.clone())
            .collect()
    }

    pub fn columns(&self, table: &TableName) -> Option<&[MemoryColumn]> {
        self.lookup(table).map(|t| t.columns.as_slice())
    }

    /// Committed rows of `table`; writes of an open transaction are hidden.
    pub fn rows(&self, table: &TableName) -> Option<&[Row]> {
        let key = self.resolve_key(table)?;
        match self.snapshot.as_ref().and_then(|s| s.get(&key)) {
            Some(rows) => Some(rows.as_slice()),
            None => self.tables.get(&key).map(|t| t.rows.as_slice()),
        }
    }

    pub fn row_count(&self, table: &TableName) -> usize {
        self.rows(table).map_or(0, <[Row]>::len)
    }

    /// Rendered SQL of every statement executed, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    fn resolve_key(&self, table: &TableName) -> Option<String> {
        if let (Some(requested), Some(own)) = (&table.database, &self.database)
            && !requested.eq_ignore_ascii_case(own)
        {
            return None;
        }
        let key = table_key(&table.schema, &table.table);
        self.tables.contains_key(&key).then_some(key)
    }

    fn lookup(&self, table: &TableName) -> Option<&MemoryTable> {
        self.resolve_key(table).and_then(|key| self.tables.get(&key))
    }

    fn table_mut(&mut self, table: &TableName) -> Result<&mut MemoryTable, DriverError> {
        let key = self
            .resolve_key(table)
            .ok_or_else(|| invalid_object(table))?;
        self.begin_write();
        self.tables.get_mut(&key).ok_or_else(|| invalid_object(table))
    }

    fn begin_write(&mut self) {
        if self.snapshot.is_none() {
            self.snapshot = Some(
                self.tables
                    .iter()
                    .map(|(key, t)| (key.clone(), t.rows.clone()))
                    .collect(),
            );
        }
    }

    fn insert_rows(
        &mut self,
        table: &TableName,
        columns: &[String],
        rows: &[Row],
    ) -> Result<u64, DriverError> {
        let target = self.lookup(table).ok_or_else(|| invalid_object(table))?;
        let positions = columns
            .iter()
            .map(|name| {
                target
                    .columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name))
                    .ok_or_else(|| {
                        DriverError::new(
                            DriverErrorKind::ObjectNotFound,
                            format!("Invalid column name '{name}'."),
                        )
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // the whole statement fails before any row lands
        let mut prepared = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != positions.len() {
                return Err(DriverError::new(
                    DriverErrorKind::Other,
                    format!(
                        "Expected {} parameter(s) but received {}",
                        positions.len(),
                        row.len()
                    ),
                ));
            }
            let mut stored: Row = vec![None; target.columns.len()];
            for (value, &position) in row.iter().zip(&positions) {
                stored[position] = value.clone();
            }
            for (column, value) in target.columns.iter().zip(&stored) {
                check_value(&target.name, column, value.as_ref())?;
            }
            prepared.push(stored);
        }

        let count = prepared.len() as u64;
        self.table_mut(table)?.rows.extend(prepared);
        Ok(count)
    }
}

fn invalid_object(table: &TableName) -> DriverError {
    DriverError::new(
        DriverErrorKind::ObjectNotFound,
        format!("Invalid object name '{table}'."),
    )
}

fn check_value(
    table: &TableName,
    column: &MemoryColumn,
    value: Option<&Value>,
) -> Result<(), DriverError> {
    let Some(value) = value else {
        if column.nullable {
            return Ok(());
        }
        return Err(DriverError::new(
            DriverErrorKind::ConstraintViolation,
            format!(
                "Cannot insert the value NULL into column '{}', table '{table}'; column does not allow nulls.",
                column.name
            ),
        ));
    };
    let conversion = || {
        DriverError::new(
            DriverErrorKind::TypeConversion,
            format!(
                "Conversion failed when converting {} to {} for column '{}'.",
                value.as_display(),
                column.sql_type,
                column.name
            ),
        )
    };
    match (column.sql_type.family(), value) {
        (TypeFamily::Integer, Value::Integer(i)) => {
            let (min, max) = integer_range(&column.sql_type.name);
            if *i < min || *i > max {
                return Err(DriverError::new(
                    DriverErrorKind::TypeConversion,
                    format!(
                        "Arithmetic overflow error converting {i} to data type {}.",
                        column.sql_type.name
                    ),
                ));
            }
        }
        (TypeFamily::Float, Value::Integer(_) | Value::Float(_)) => {}
        (TypeFamily::Boolean, Value::Boolean(_)) => {}
        (TypeFamily::Boolean, Value::Integer(0 | 1)) => {}
        (TypeFamily::Date, Value::Date(_)) => {}
        (TypeFamily::DateTime, Value::DateTime(_) | Value::Date(_)) => {}
        (TypeFamily::String, value) => {
            if let Some(capacity) = column.sql_type.char_capacity()
                && value.as_display().chars().count() > capacity
            {
                return Err(DriverError::new(
                    DriverErrorKind::Truncation,
                    format!(
                        "String or binary data would be truncated in table '{table}', column '{}'.",
                        column.name
                    ),
                ));
            }
        }
        _ => return Err(conversion()),
    }
    Ok(())
}

fn integer_range(type_name: &str) -> (i64, i64) {
    match type_name {
        "tinyint" => (0, 255),
        "smallint" => (i16::MIN.into(), i16::MAX.into()),
        "int" => (i32::MIN.into(), i32::MAX.into()),
        _ => (i64::MIN, i64::MAX),
    }
}

impl Connection for MemoryConnection {
    fn query_columns(&mut self, statement: &Statement) -> Result<Vec<RawColumn>, DriverError> {
        self.executed.push(statement.to_sql());
        let Statement::ColumnMetadata { table } = statement else {
            return Err(DriverError::new(
                DriverErrorKind::Unsupported,
                "only column metadata queries return rows",
            ));
        };
        if self.faults.deny_metadata {
            return Err(DriverError::new(
                DriverErrorKind::PermissionDenied,
                format!("The SELECT permission was denied on the object '{table}'."),
            ));
        }
        Ok(self
            .lookup(table)
            .map(|t| {
                t.columns
                    .iter()
                    .map(|c| RawColumn {
                        name: c.name.clone(),
                        type_name: c.sql_type.name.clone(),
                        max_length: c.sql_type.reported_max_length(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn execute(&mut self, statement: &Statement) -> Result<u64, DriverError> {
        let sql = statement.to_sql();
        debug!("memory: {sql}");
        self.executed.push(sql);
        match statement {
            Statement::DeleteAll { table } => {
                if let Some(err) = self.faults.delete.clone() {
                    return Err(err);
                }
                let target = self.table_mut(table)?;
                let removed = target.rows.len() as u64;
                target.rows.clear();
                Ok(removed)
            }
            Statement::Truncate { table } => {
                let target = self.lookup(table).ok_or_else(|| invalid_object(table))?;
                if let Some(referencing) = target.referenced_by.first() {
                    return Err(DriverError::new(
                        DriverErrorKind::ConstraintViolation,
                        format!(
                            "Cannot truncate table '{table}' because it is being referenced by a FOREIGN KEY constraint on '{referencing}'."
                        ),
                    ));
                }
                self.table_mut(table)?.rows.clear();
                Ok(0)
            }
            Statement::Insert { .. } | Statement::ColumnMetadata { .. } => Err(DriverError::new(
                DriverErrorKind::Unsupported,
                "statement requires execute_many or query_columns",
            )),
        }
    }

    fn execute_many(&mut self, statement: &Statement, rows: &[Row]) -> Result<u64, DriverError> {
        self.insert_calls += 1;
        self.executed.push(statement.to_sql());
        if let Some((call, err)) = &self.faults.insert
            && *call == self.insert_calls
        {
            return Err(err.clone());
        }
        match statement {
            Statement::Insert { table, columns } => self.insert_rows(table, columns, rows),
            _ => Err(DriverError::new(
                DriverErrorKind::Unsupported,
                "only INSERT statements accept parameter rows",
            )),
        }
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.commit_calls += 1;
        if let Some((call, err)) = &self.faults.commit
            && *call == self.commit_calls
        {
            return Err(err.clone());
        }
        self.snapshot = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        if let Some(snapshot) = self.snapshot.take() {
            for (key, rows) in snapshot {
                if let Some(table) = self.tables.get_mut(&key) {
                    table.rows = rows;
                }
            }
        }
        Ok(())
    }
}
