use std::fmt;
use std::time::Duration;

use rusqlite::OpenFlags;
use serde::Deserialize;

use crate::error::{NativeError, Result, SqlOffloadError};

/// Options for creating a [`Pool`](crate::Pool).
///
/// Deserializes from camelCase keys so a pool can be described in JSON:
/// ```rust
/// use sql_offload::prelude::*;
///
/// let cfg = PoolConfig::from_json(
///     r#"{"connectString": "app.db", "poolMin": 1, "poolMax": 2, "poolIncrement": 1}"#,
/// )?;
/// assert_eq!(cfg.pool_max, 2);
/// # Ok::<(), SqlOffloadError>(())
/// ```
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolConfig {
    /// Database path or `file:` URI.
    pub connect_string: String,
    /// Accepted for API parity; `SQLite` has no server-side authentication.
    pub username: Option<String>,
    /// Accepted for API parity; never logged.
    pub password: Option<String>,
    pub pool_min: usize,
    pub pool_max: usize,
    pub pool_increment: usize,
    /// How long a checkout waits for a free session before failing; 0 fails immediately.
    pub queue_timeout_ms: u64,
    /// `SQLite` busy handler timeout applied to every session.
    pub busy_timeout_ms: u64,
    /// Switch file databases to WAL journaling when sessions open.
    pub wal_journal: bool,
    /// Open sessions read-only; the database must already exist.
    pub read_only: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connect_string: String::new(),
            username: None,
            password: None,
            pool_min: 0,
            pool_max: 4,
            pool_increment: 1,
            queue_timeout_ms: 60_000,
            busy_timeout_ms: 5_000,
            wal_journal: false,
            read_only: false,
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("connect_string", &self.connect_string)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pool_min", &self.pool_min)
            .field("pool_max", &self.pool_max)
            .field("pool_increment", &self.pool_increment)
            .field("queue_timeout_ms", &self.queue_timeout_ms)
            .field("busy_timeout_ms", &self.busy_timeout_ms)
            .field("wal_journal", &self.wal_journal)
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl PoolConfig {
    #[must_use]
    pub fn new(connect_string: impl Into<String>) -> Self {
        Self {
            connect_string: connect_string.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn builder(connect_string: impl Into<String>) -> PoolConfigBuilder {
        PoolConfigBuilder::new(connect_string)
    }

    /// Parse a JSON pool description.
    ///
    /// # Errors
    /// Returns [`SqlOffloadError::Initialization`] when the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| SqlOffloadError::Initialization(format!("invalid pool config: {e}")))
    }

    /// Check sizing and location.
    ///
    /// # Errors
    /// Returns [`SqlOffloadError::Initialization`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.connect_string.trim().is_empty() {
            return Err(SqlOffloadError::Initialization(
                "connectString must not be empty".into(),
            ));
        }
        if self.pool_max == 0 {
            return Err(SqlOffloadError::Initialization(
                "poolMax must be at least 1".into(),
            ));
        }
        if self.pool_min > self.pool_max {
            return Err(SqlOffloadError::Initialization(format!(
                "poolMin ({}) exceeds poolMax ({})",
                self.pool_min, self.pool_max
            )));
        }
        if self.pool_increment == 0 {
            return Err(SqlOffloadError::Initialization(
                "poolIncrement must be at least 1".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }
}

/// Fluent builder for [`PoolConfig`].
#[derive(Debug, Clone)]
pub struct PoolConfigBuilder {
    cfg: PoolConfig,
}

impl PoolConfigBuilder {
    #[must_use]
    pub fn new(connect_string: impl Into<String>) -> Self {
        Self {
            cfg: PoolConfig::new(connect_string),
        }
    }

    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.cfg.username = Some(username.into());
        self.cfg.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn sizing(mut self, min: usize, max: usize, increment: usize) -> Self {
        self.cfg.pool_min = min;
        self.cfg.pool_max = max;
        self.cfg.pool_increment = increment;
        self
    }

    #[must_use]
    pub fn queue_timeout(mut self, timeout: Duration) -> Self {
        self.cfg.queue_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.cfg.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn wal_journal(mut self, enabled: bool) -> Self {
        self.cfg.wal_journal = enabled;
        self
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.cfg.read_only = read_only;
        self
    }

    #[must_use]
    pub fn finish(self) -> PoolConfig {
        self.cfg
    }
}

/// Shared, read-only parameters every session of one pool is opened with.
#[derive(Debug, Clone)]
pub(crate) struct Environment {
    location: String,
    flags: OpenFlags,
    busy_timeout: Duration,
    wal_journal: bool,
}

impl Environment {
    pub(crate) fn from_config(cfg: &PoolConfig) -> Self {
        let flags = if cfg.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::default()
        };
        Self {
            location: cfg.connect_string.clone(),
            flags,
            busy_timeout: Duration::from_millis(cfg.busy_timeout_ms),
            wal_journal: cfg.wal_journal && !cfg.read_only,
        }
    }

    pub(crate) fn location(&self) -> &str {
        &self.location
    }

    /// Open one native session. Blocking; never called with pool bookkeeping locked.
    pub(crate) fn open_session(&self) -> std::result::Result<rusqlite::Connection, NativeError> {
        let conn = rusqlite::Connection::open_with_flags(&self.location, self.flags)?;
        conn.busy_timeout(self.busy_timeout)?;
        if self.wal_journal {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            tracing::debug!(location = %self.location, %mode, "journal mode applied");
        }
        Ok(conn)
    }
}
