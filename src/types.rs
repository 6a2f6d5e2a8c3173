use chrono::NaiveDateTime;
use serde::Serialize;

/// Values that can be bound as statement parameters or read back from a result row.
///
/// ```rust
/// use sql_offload::prelude::*;
///
/// let binds = vec![
///     Value::Integer(1),
///     Value::String("alice".into()),
///     Value::Null,
/// ];
/// # let _ = binds;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Integer value (64-bit)
    Integer(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text value
    String(String),
    /// Date/time value
    Date(NaiveDateTime),
    /// Binary data
    Binary(Vec<u8>),
    /// Boolean; bound as 0/1 and read back as `Integer`
    Bool(bool),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            Value::Bool(flag) => Some(i64::from(*flag)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let Value::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::String(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDateTime> {
        if let Value::Date(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let Value::Binary(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Date(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Type tag of a result column, fixed once per executed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Date,
    Binary,
    /// No declared type and no non-null value to infer one from.
    Null,
}

/// Destroy mode for [`crate::Pool::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseMode {
    /// Refuse to close while connections are checked out.
    #[default]
    Default,
    /// Close regardless, invalidating checked-out connections.
    Force,
}
