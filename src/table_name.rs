//! Qualified table references: `[database.]schema.table` or a bare `table`.
//!
//! Each segment may be wrapped in `[...]`; inside brackets dots are literal
//! and `]]` stands for a single `]`. A bare table name lands in `dbo`.

use std::{fmt, str::FromStr};

use crate::error::NameParseError;

pub const DEFAULT_SCHEMA: &str = "dbo";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub database: Option<String>,
    pub schema: String,
    pub table: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: None,
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn parse(input: &str) -> Result<Self, NameParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(NameParseError::Empty);
        }
        let segments = split_segments(trimmed)?;
        match segments.as_slice() {
            [table] => Ok(TableName::new(DEFAULT_SCHEMA, table.as_str())),
            [schema, table] => Ok(TableName::new(schema.as_str(), table.as_str())),
            [database, schema, table] => {
                Ok(TableName::new(schema.as_str(), table.as_str()).with_database(database.as_str()))
            }
            other => Err(NameParseError::SegmentCount {
                input: input.to_string(),
                count: other.len(),
            }),
        }
    }

    /// Bracket-quoted form suitable for embedding in T-SQL.
    pub fn quoted(&self) -> String {
        let mut rendered = String::new();
        if let Some(database) = &self.database {
            rendered.push_str(&quote_identifier(database));
            rendered.push('.');
        }
        rendered.push_str(&quote_identifier(&self.schema));
        rendered.push('.');
        rendered.push_str(&quote_identifier(&self.table));
        rendered
    }

    /// Prefix for catalog views, e.g. `[Sales].` for a three-part name.
    pub fn catalog_prefix(&self) -> String {
        self.database
            .as_deref()
            .map(|db| format!("{}.", quote_identifier(db)))
            .unwrap_or_default()
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted())
    }
}

impl FromStr for TableName {
    type Err = NameParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TableName::parse(value)
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

fn split_segments(input: &str) -> Result<Vec<String>, NameParseError> {
    let mut segments = Vec::new();
    let mut chars = input.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let segment = if chars.next_if_eq(&'[').is_some() {
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some(']') if chars.next_if_eq(&']').is_some() => name.push(']'),
                    Some(']') => break,
                    Some(c) => name.push(c),
                    None => {
                        return Err(NameParseError::UnterminatedBracket {
                            input: input.to_string(),
                        });
                    }
                }
            }
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if let Some(&found) = chars.peek()
                && found != '.'
            {
                return Err(NameParseError::TrailingCharacters {
                    input: input.to_string(),
                    found,
                });
            }
            name
        } else {
            let mut name = String::new();
            while let Some(c) = chars.next_if(|c| *c != '.') {
                name.push(c);
            }
            name.trim().to_string()
        };
        if segment.trim().is_empty() {
            return Err(NameParseError::EmptySegment {
                input: input.to_string(),
            });
        }
        segments.push(segment);
        if chars.next_if_eq(&'.').is_none() {
            break;
        }
    }
    Ok(segments)
}
