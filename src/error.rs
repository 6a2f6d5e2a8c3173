use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Error object reported by the native client library.
///
/// `code` carries SQLite's extended result code when the engine raised the failure, and is
/// `None` for failures detected on the driver side (bind-count mismatches, type conversion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeError {
    pub code: Option<i32>,
    pub message: String,
}

impl NativeError {
    #[must_use]
    pub fn new(code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<rusqlite::Error> for NativeError {
    fn from(err: rusqlite::Error) -> Self {
        NativeError::from(&err)
    }
}

impl From<&rusqlite::Error> for NativeError {
    fn from(err: &rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ffi_err, message) => NativeError {
                code: Some(ffi_err.extended_code),
                message: message.clone().unwrap_or_else(|| ffi_err.to_string()),
            },
            other => NativeError {
                code: None,
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum SqlOffloadError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Pool busy: {busy} connection(s) still checked out")]
    PoolBusy { busy: usize },

    #[error("Pool is closed")]
    PoolClosed,

    #[error("Pool exhausted: no connection available after {waited_ms} ms")]
    PoolExhausted { waited_ms: u64 },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("SQL execution error: {source} (sql: {sql})")]
    Execution { sql: String, source: NativeError },

    #[error("Commit failed: {0}")]
    Commit(NativeError),

    #[error("Rollback failed: {0}")]
    Rollback(NativeError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task engine has been shut down")]
    EngineShutdown,

    #[error("Worker panicked while running {0}")]
    WorkerPanic(String),
}

impl SqlOffloadError {
    pub(crate) fn execution(sql: &str, err: impl Into<NativeError>) -> Self {
        SqlOffloadError::Execution {
            sql: sql.to_owned(),
            source: err.into(),
        }
    }

    /// Native error code carried by execution and transaction failures, if any.
    #[must_use]
    pub fn native_code(&self) -> Option<i32> {
        match self {
            SqlOffloadError::Execution { source, .. }
            | SqlOffloadError::Commit(source)
            | SqlOffloadError::Rollback(source) => source.code,
            _ => None,
        }
    }
}

impl std::error::Error for NativeError {}

pub type Result<T> = std::result::Result<T, SqlOffloadError>;
