//! Destination column model and T-SQL type vocabulary.
//!
//! [`TypeFamily`] is the coarse semantic type the coercer targets.
//! [`SqlType`] is a declared T-SQL type such as `nvarchar(50)`; it is what
//! catalogs declare and what the metadata view reports back.

use std::{fmt, str::FromStr, sync::LazyLock};

use anyhow::{Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeFamily {
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    String,
}

impl TypeFamily {
    pub fn from_sql_type(type_name: &str) -> Self {
        match type_name.trim().to_ascii_lowercase().as_str() {
            "tinyint" | "smallint" | "int" | "bigint" => TypeFamily::Integer,
            "decimal" | "numeric" | "money" | "smallmoney" | "float" | "real" => {
                TypeFamily::Float
            }
            "bit" => TypeFamily::Boolean,
            "date" => TypeFamily::Date,
            "datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" => TypeFamily::DateTime,
            _ => TypeFamily::String,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeFamily::Integer => "integer",
            TypeFamily::Float => "float",
            TypeFamily::Boolean => "boolean",
            TypeFamily::Date => "date",
            TypeFamily::DateTime => "datetime",
            TypeFamily::String => "string",
        }
    }

    fn default_sql_type(&self) -> &'static str {
        match self {
            TypeFamily::Integer => "int",
            TypeFamily::Float => "float",
            TypeFamily::Boolean => "bit",
            TypeFamily::Date => "date",
            TypeFamily::DateTime => "datetime",
            TypeFamily::String => "nvarchar",
        }
    }
}

impl fmt::Display for TypeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationColumn {
    pub name: String,
    pub type_family: TypeFamily,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_char_length: Option<usize>,
    pub sql_type: String,
}

impl DestinationColumn {
    pub fn new(name: impl Into<String>, type_family: TypeFamily) -> Self {
        Self {
            name: name.into(),
            type_family,
            max_char_length: None,
            sql_type: type_family.default_sql_type().to_string(),
        }
    }

    pub fn with_max_char_length(mut self, length: usize) -> Self {
        self.max_char_length = Some(length);
        self
    }

    pub fn with_sql_type(mut self, sql_type: impl Into<String>) -> Self {
        self.sql_type = sql_type.into();
        self
    }

    pub fn describe_type(&self) -> String {
        match self.max_char_length {
            Some(length) => format!("{}({length})", self.sql_type),
            None => self.sql_type.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeLength {
    Chars(usize),
    Max,
}

/// A declared T-SQL type, e.g. `int`, `varchar(50)`, `nvarchar(max)`,
/// `decimal(18,2)`. Precision and scale are accepted but not retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlType {
    pub name: String,
    pub length: Option<TypeLength>,
}

static SQL_TYPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([a-z][a-z0-9_]*)\s*(?:\(\s*(max|\d+)\s*(?:,\s*\d+\s*)?\))?\s*$")
        .expect("valid SQL type pattern")
});

impl SqlType {
    pub fn family(&self) -> TypeFamily {
        TypeFamily::from_sql_type(&self.name)
    }

    pub fn is_character(&self) -> bool {
        matches!(
            self.name.as_str(),
            "char" | "varchar" | "nchar" | "nvarchar" | "text" | "ntext" | "sysname"
        )
    }

    pub fn is_double_byte(&self) -> bool {
        matches!(self.name.as_str(), "nchar" | "nvarchar" | "ntext" | "sysname")
    }

    /// Maximum character count a value may hold, if bounded.
    pub fn char_capacity(&self) -> Option<usize> {
        match (self.name.as_str(), self.length) {
            ("sysname", _) => Some(128),
            ("char" | "nchar" | "varchar" | "nvarchar", None) => Some(1),
            (_, Some(TypeLength::Chars(n))) if self.is_character() => Some(n),
            _ => None,
        }
    }

    /// `max_length` as `sys.columns` reports it: bytes, `-1` for `max`,
    /// 16 for the legacy LOB pointer types.
    pub fn reported_max_length(&self) -> Option<i32> {
        match self.name.as_str() {
            "text" | "ntext" | "image" => return Some(16),
            "xml" => return Some(-1),
            _ => {}
        }
        if matches!(self.length, Some(TypeLength::Max)) {
            return Some(-1);
        }
        let chars = self.char_capacity()?;
        let bytes = if self.is_double_byte() { chars * 2 } else { chars };
        Some(i32::try_from(bytes).unwrap_or(i32::MAX))
    }
}

impl FromStr for SqlType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let captures = SQL_TYPE_PATTERN
            .captures(value)
            .ok_or_else(|| anyhow!("Unrecognised SQL type '{value}'"))?;
        let name = captures[1].to_ascii_lowercase();
        let length = match captures.get(2).map(|m| m.as_str()) {
            Some(token) if token.eq_ignore_ascii_case("max") => Some(TypeLength::Max),
            Some(token) => Some(TypeLength::Chars(
                token
                    .parse()
                    .map_err(|_| anyhow!("Invalid length in SQL type '{value}'"))?,
            )),
            None => None,
        };
        Ok(SqlType { name, length })
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.length {
            Some(TypeLength::Chars(n)) => write!(f, "{}({n})", self.name),
            Some(TypeLength::Max) => write!(f, "{}(max)", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_follow_tsql_type_names() {
        assert_eq!(TypeFamily::from_sql_type("BIGINT"), TypeFamily::Integer);
        assert_eq!(TypeFamily::from_sql_type("money"), TypeFamily::Float);
        assert_eq!(TypeFamily::from_sql_type("bit"), TypeFamily::Boolean);
        assert_eq!(TypeFamily::from_sql_type("date"), TypeFamily::Date);
        assert_eq!(
            TypeFamily::from_sql_type("smalldatetime"),
            TypeFamily::DateTime
        );
        assert_eq!(TypeFamily::from_sql_type("time"), TypeFamily::String);
        assert_eq!(
            TypeFamily::from_sql_type("uniqueidentifier"),
            TypeFamily::String
        );
    }

    #[test]
    fn parses_declared_types() {
        let varchar: SqlType = "VARCHAR(50)".parse().unwrap();
        assert_eq!(varchar.name, "varchar");
        assert_eq!(varchar.length, Some(TypeLength::Chars(50)));
        assert_eq!(varchar.reported_max_length(), Some(50));

        let nvarchar: SqlType = "nvarchar( 40 )".parse().unwrap();
        assert_eq!(nvarchar.reported_max_length(), Some(80));
        assert_eq!(nvarchar.char_capacity(), Some(40));

        let unbounded: SqlType = "nvarchar(max)".parse().unwrap();
        assert_eq!(unbounded.reported_max_length(), Some(-1));
        assert_eq!(unbounded.char_capacity(), None);

        let decimal: SqlType = "decimal(18, 2)".parse().unwrap();
        assert_eq!(decimal.family(), TypeFamily::Float);
        assert_eq!(decimal.reported_max_length(), None);

        assert!("varchar(".parse::<SqlType>().is_err());
    }

    #[test]
    fn describe_type_includes_length() {
        let column = DestinationColumn::new("Name", TypeFamily::String)
            .with_sql_type("varchar")
            .with_max_char_length(50);
        assert_eq!(column.describe_type(), "varchar(50)");
    }
}
