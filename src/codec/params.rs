use rusqlite::types::Value as NativeValue;

use crate::error::{Result, SqlOffloadError};
use crate::types::Value;

use super::DATE_FORMATS;

/// Convert a single caller value to a native bind value.
///
/// # Errors
/// Returns [`SqlOffloadError::InvalidArgument`] for non-finite floats, which `SQLite` would
/// silently store as NULL.
pub fn value_to_native(value: &Value) -> Result<NativeValue> {
    let native = match value {
        Value::Null => NativeValue::Null,
        Value::Integer(i) => NativeValue::Integer(*i),
        Value::Float(f) => {
            if !f.is_finite() {
                return Err(SqlOffloadError::InvalidArgument(format!(
                    "float bind value must be finite, got {f}"
                )));
            }
            NativeValue::Real(*f)
        }
        Value::String(s) => NativeValue::Text(s.clone()),
        Value::Date(dt) => NativeValue::Text(dt.format(DATE_FORMATS[0]).to_string()),
        Value::Binary(bytes) => NativeValue::Blob(bytes.clone()),
        Value::Bool(b) => NativeValue::Integer(i64::from(*b)),
    };
    Ok(native)
}

/// Positional bind values, already converted on the caller's thread so that malformed input
/// fails before any work is scheduled.
#[derive(Debug, Clone, Default)]
pub struct BindValues(Vec<NativeValue>);

impl BindValues {
    /// Convert caller values into native bind values.
    ///
    /// # Errors
    /// Returns [`SqlOffloadError::InvalidArgument`] naming the offending position.
    pub fn convert(values: &[Value]) -> Result<Self> {
        let mut native = Vec::with_capacity(values.len());
        for (position, value) in values.iter().enumerate() {
            let converted = value_to_native(value).map_err(|err| match err {
                SqlOffloadError::InvalidArgument(msg) => {
                    SqlOffloadError::InvalidArgument(format!("bind {}: {msg}", position + 1))
                }
                other => other,
            })?;
            native.push(converted);
        }
        Ok(BindValues(native))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_values(&self) -> &[NativeValue] {
        &self.0
    }
}
