//! Value coercion into destination type families.
//!
//! Coercion never fails. A value that cannot be represented in its column's
//! family becomes null and is counted as a degradation; an over-long string
//! is cut to the column width and counted as a truncation.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::{
    data::{RawValue, Value, format_datetime, format_float, parse_naive_date, parse_naive_datetime},
    schema::{DestinationColumn, TypeFamily},
};

static DATE_MIN: LazyLock<NaiveDate> =
    LazyLock::new(|| NaiveDate::from_ymd_opt(1, 1, 1).expect("valid minimum date"));
static DATE_MAX: LazyLock<NaiveDate> =
    LazyLock::new(|| NaiveDate::from_ymd_opt(9999, 12, 31).expect("valid maximum date"));
static DATETIME_MIN: LazyLock<NaiveDateTime> = LazyLock::new(|| {
    NaiveDate::from_ymd_opt(1753, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid minimum datetime")
});
static DATETIME_MAX: LazyLock<NaiveDateTime> = LazyLock::new(|| {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .expect("valid maximum datetime")
});

const TRUE_TOKENS: &[&str] = &["1", "true", "yes", "y", "t", "on"];
const FALSE_TOKENS: &[&str] = &["0", "false", "no", "n", "f", "off"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The raw value was already null-equivalent.
    Null,
    Converted,
    Truncated,
    /// A non-null raw value that could not be represented and became null.
    Degraded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub value: Option<Value>,
    pub outcome: Outcome,
}

impl Coerced {
    fn converted(value: Value) -> Self {
        Self {
            value: Some(value),
            outcome: Outcome::Converted,
        }
    }

    fn null() -> Self {
        Self {
            value: None,
            outcome: Outcome::Null,
        }
    }

    fn degraded() -> Self {
        Self {
            value: None,
            outcome: Outcome::Degraded,
        }
    }

    fn from_option(value: Option<Value>) -> Self {
        value.map_or_else(Self::degraded, Self::converted)
    }
}

pub fn coerce(raw: &RawValue, column: &DestinationColumn) -> Coerced {
    if raw.is_null_equivalent() {
        return Coerced::null();
    }
    match column.type_family {
        TypeFamily::Integer => Coerced::from_option(to_integer(raw).map(Value::Integer)),
        TypeFamily::Float => Coerced::from_option(to_float(raw).map(Value::Float)),
        TypeFamily::Boolean => Coerced::from_option(to_boolean(raw).map(Value::Boolean)),
        TypeFamily::Date => Coerced::from_option(
            to_date(raw)
                .filter(|d| (*DATE_MIN..=*DATE_MAX).contains(d))
                .map(Value::Date),
        ),
        TypeFamily::DateTime => Coerced::from_option(
            to_datetime(raw)
                .filter(|dt| (*DATETIME_MIN..=*DATETIME_MAX).contains(dt))
                .map(Value::DateTime),
        ),
        TypeFamily::String => {
            let text = stringify(raw);
            match column.max_char_length {
                Some(limit) if text.chars().count() > limit => Coerced {
                    value: Some(Value::String(text.chars().take(limit).collect())),
                    outcome: Outcome::Truncated,
                },
                _ => Coerced::converted(Value::String(text)),
            }
        }
    }
}

fn to_integer(raw: &RawValue) -> Option<i64> {
    match raw {
        RawValue::Integer(i) => Some(*i),
        RawValue::Float(f) => integral_float(*f),
        RawValue::Boolean(b) => Some(i64::from(*b)),
        RawValue::Text(text) => {
            let trimmed = text.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(integral_float))
        }
        RawValue::Null | RawValue::Date(_) | RawValue::DateTime(_) => None,
    }
}

fn integral_float(value: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
    if value.is_finite()
        && value.fract() == 0.0
        && value >= i64::MIN as f64
        && value < i64::MAX as f64
    {
        Some(value as i64)
    } else {
        None
    }
}

fn to_float(raw: &RawValue) -> Option<f64> {
    let value = match raw {
        RawValue::Integer(i) => *i as f64,
        RawValue::Float(f) => *f,
        RawValue::Boolean(b) => f64::from(u8::from(*b)),
        RawValue::Text(text) => text.trim().parse::<f64>().ok()?,
        RawValue::Null | RawValue::Date(_) | RawValue::DateTime(_) => return None,
    };
    value.is_finite().then_some(value)
}

fn to_boolean(raw: &RawValue) -> Option<bool> {
    match raw {
        RawValue::Boolean(b) => Some(*b),
        RawValue::Integer(1) => Some(true),
        RawValue::Integer(0) => Some(false),
        RawValue::Float(f) if *f == 1.0 => Some(true),
        RawValue::Float(f) if *f == 0.0 => Some(false),
        RawValue::Text(text) => {
            let token = text.trim().to_ascii_lowercase();
            if TRUE_TOKENS.contains(&token.as_str()) {
                Some(true)
            } else if FALSE_TOKENS.contains(&token.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn to_date(raw: &RawValue) -> Option<NaiveDate> {
    match raw {
        RawValue::Date(d) => Some(*d),
        RawValue::DateTime(dt) => Some(dt.date()),
        RawValue::Text(text) => parse_naive_date(text)
            .ok()
            .or_else(|| parse_naive_datetime(text).ok().map(|dt| dt.date())),
        _ => None,
    }
}

fn to_datetime(raw: &RawValue) -> Option<NaiveDateTime> {
    match raw {
        RawValue::DateTime(dt) => Some(*dt),
        RawValue::Date(d) => Some(d.and_time(NaiveTime::MIN)),
        RawValue::Text(text) => parse_naive_datetime(text)
            .ok()
            .or_else(|| parse_naive_date(text).ok().map(|d| d.and_time(NaiveTime::MIN))),
        _ => None,
    }
}

fn stringify(raw: &RawValue) -> String {
    match raw {
        RawValue::Null => String::new(),
        RawValue::Integer(i) => i.to_string(),
        RawValue::Float(f) => format_float(*f),
        RawValue::Boolean(b) => b.to_string(),
        RawValue::Text(text) => text.clone(),
        RawValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        RawValue::DateTime(dt) => format_datetime(dt),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnCoercionStats {
    pub column: String,
    pub degraded: usize,
    pub truncated: usize,
}

/// Per-column degradation and truncation counters for one upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoercionStats {
    pub columns: Vec<ColumnCoercionStats>,
}

impl CoercionStats {
    pub fn for_columns(columns: &[DestinationColumn]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|c| ColumnCoercionStats {
                    column: c.name.clone(),
                    ..Default::default()
                })
                .collect(),
        }
    }

    pub fn record(&mut self, index: usize, outcome: Outcome) {
        let Some(entry) = self.columns.get_mut(index) else {
            return;
        };
        match outcome {
            Outcome::Degraded => entry.degraded += 1,
            Outcome::Truncated => entry.truncated += 1,
            Outcome::Null | Outcome::Converted => {}
        }
    }

    pub fn truncated_total(&self) -> usize {
        self.columns.iter().map(|c| c.truncated).sum()
    }

    pub fn degraded_total(&self) -> usize {
        self.columns.iter().map(|c| c.degraded).sum()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnCoercionStats> {
        self.columns.iter().find(|c| c.column == name)
    }
}

/// Coerces whole rows already projected into destination order.
#[derive(Debug, Clone)]
pub struct TypeCoercer {
    columns: Vec<DestinationColumn>,
    stats: CoercionStats,
}

impl TypeCoercer {
    pub fn new(columns: Vec<DestinationColumn>) -> Self {
        let stats = CoercionStats::for_columns(&columns);
        Self { columns, stats }
    }

    pub fn columns(&self) -> &[DestinationColumn] {
        &self.columns
    }

    pub fn coerce_row(&mut self, row: &[RawValue]) -> Vec<Option<Value>> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let raw = row.get(idx).unwrap_or(&RawValue::Null);
                let coerced = coerce(raw, column);
                self.stats.record(idx, coerced.outcome);
                coerced.value
            })
            .collect()
    }

    pub fn stats(&self) -> &CoercionStats {
        &self.stats
    }
}
