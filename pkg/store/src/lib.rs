use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fmt,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

mod memory;
mod statement;

pub use memory::InMemoryStore;
pub use statement::{Direction, Filter, OrderBy, Projection, Statement};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

/// Failure to map a loosely-typed row onto a fixed record shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("missing column `{column}`")]
    MissingColumn { column: String },
    #[error("column `{column}` is null")]
    NullValue { column: String },
    #[error("column `{column}` expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("column `{column}` out of range: {value}")]
    OutOfRange { column: String, value: String },
}

/// The data-fetch capability consumed by the aggregation pipeline.
///
/// Implementations bind every filter value as a parameter; see
/// [`Statement::to_sql`] for the rendered form.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, StoreError>;
}

// ---------------------------------------------------------------------------
// Scalar values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Numeric view of the value. Decimal columns commonly come back from
    /// SQL drivers as text, so numeric text is accepted too.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Text(value) => value.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            Self::Text(value) => value.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Float(_) => 2,
            Self::Text(_) => 3,
            Self::Timestamp(_) => 4,
        }
    }

    /// Total order used for `ORDER BY`: nulls first, numbers compared across
    /// int/float, mismatched kinds ordered by kind.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                let a = self.as_f64().unwrap_or(f64::NAN);
                let b = other.as_f64().unwrap_or(f64::NAN);
                a.total_cmp(&b)
            }
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// SQL equality: null never equals anything.
    pub fn sql_eq(&self, other: &Self) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        self.rank() == other.rank() && self.total_cmp(other) == Ordering::Equal
    }

    /// Converts a JSON fixture value. Strings that parse as RFC 3339 become
    /// timestamps so snapshot columns compare chronologically.
    pub fn from_json(value: serde_json::Value) -> Result<Self, StoreError> {
        match value {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(value) => Ok(Self::Bool(value)),
            serde_json::Value::Number(number) => {
                if let Some(value) = number.as_i64() {
                    Ok(Self::Int(value))
                } else if let Some(value) = number.as_f64() {
                    Ok(Self::Float(value))
                } else {
                    Err(StoreError::Parse(format!("unsupported number: {number}")))
                }
            }
            serde_json::Value::String(value) => match DateTime::parse_from_rfc3339(&value) {
                Ok(parsed) => Ok(Self::Timestamp(parsed.with_timezone(&Utc))),
                Err(_) => Ok(Self::Text(value)),
            },
            other => Err(StoreError::Parse(format!(
                "row values must be scalars, found {other}"
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Timestamp(value) => f.write_str(&value.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<Value>) {
        self.columns.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn value_or_null(&self, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.columns.get(column).unwrap_or(&NULL)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn required(&self, column: &str) -> Result<&Value, DecodeError> {
        match self.columns.get(column) {
            None => Err(DecodeError::MissingColumn {
                column: column.to_string(),
            }),
            Some(Value::Null) => Err(DecodeError::NullValue {
                column: column.to_string(),
            }),
            Some(value) => Ok(value),
        }
    }

    pub fn require_text(&self, column: &str) -> Result<&str, DecodeError> {
        let value = self.required(column)?;
        value.as_str().ok_or_else(|| DecodeError::TypeMismatch {
            column: column.to_string(),
            expected: "text",
            found: value.kind(),
        })
    }

    pub fn optional_text(&self, column: &str) -> Result<Option<&str>, DecodeError> {
        match self.columns.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| DecodeError::TypeMismatch {
                    column: column.to_string(),
                    expected: "text",
                    found: value.kind(),
                }),
        }
    }

    pub fn require_f64(&self, column: &str) -> Result<f64, DecodeError> {
        let value = self.required(column)?;
        value.as_f64().ok_or_else(|| DecodeError::TypeMismatch {
            column: column.to_string(),
            expected: "number",
            found: value.kind(),
        })
    }

    pub fn optional_f64(&self, column: &str) -> Result<Option<f64>, DecodeError> {
        match self.columns.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| DecodeError::TypeMismatch {
                    column: column.to_string(),
                    expected: "number",
                    found: value.kind(),
                }),
        }
    }

    pub fn require_u32(&self, column: &str) -> Result<u32, DecodeError> {
        let value = self.required(column)?;
        let raw = value.as_i64().ok_or_else(|| DecodeError::TypeMismatch {
            column: column.to_string(),
            expected: "integer",
            found: value.kind(),
        })?;
        u32::try_from(raw).map_err(|_| DecodeError::OutOfRange {
            column: column.to_string(),
            value: raw.to_string(),
        })
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}
