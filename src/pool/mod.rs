//! Connection pool: owns the native sessions and lends them out as [`Connection`]s.
//!
//! Checkout policy: when every session is busy and the pool is at `poolMax`, a checkout waits
//! up to `queueTimeoutMs` for a release, then fails with
//! [`SqlOffloadError::PoolExhausted`](crate::SqlOffloadError::PoolExhausted).

pub mod config;
pub(crate) mod session;
pub(crate) mod state;
pub mod types;

use std::sync::Arc;

pub use config::{PoolConfig, PoolConfigBuilder};
pub use types::PoolInfo;

use crate::connection::Connection;
use crate::engine::TaskEngine;
use crate::error::Result;
use crate::types::CloseMode;

use state::PoolShared;

/// Handle to a pool of reusable `SQLite` sessions. Cheap to clone; clones share one pool.
#[derive(Clone, Debug)]
pub struct Pool {
    shared: Arc<PoolShared>,
    engine: Arc<TaskEngine>,
}

impl Pool {
    /// Create a pool and open its `poolMin` initial sessions on the calling thread.
    ///
    /// # Errors
    /// Returns [`SqlOffloadError::Initialization`](crate::SqlOffloadError::Initialization) for
    /// invalid sizing or when an initial session cannot be opened.
    pub fn create(engine: &Arc<TaskEngine>, config: PoolConfig) -> Result<Self> {
        let shared = PoolShared::create(&config)?;
        tracing::info!(
            location = %config.connect_string,
            min = config.pool_min,
            max = config.pool_max,
            increment = config.pool_increment,
            "pool created"
        );
        Ok(Self {
            shared,
            engine: Arc::clone(engine),
        })
    }

    /// Check out a connection, blocking the caller while a session is opened or waited for.
    ///
    /// # Errors
    /// `PoolClosed` after close, `PoolExhausted` when the queue timeout elapses, `Connection`
    /// when a new session cannot be opened.
    pub fn get_connection(&self) -> Result<Connection> {
        let slot = self.shared.checkout()?;
        Ok(Connection::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.shared),
            slot,
        ))
    }

    /// Check out a connection on a worker thread; `callback` receives it during dispatch.
    ///
    /// The same waiting policy as [`get_connection`](Self::get_connection) applies, but the
    /// wait happens on the worker, so the calling thread returns at once.
    pub fn get_connection_async<F>(&self, callback: F)
    where
        F: FnOnce(Result<Connection>) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let engine = Arc::clone(&self.engine);
        self.engine.call_async(
            "get_connection",
            Box::new(move || -> Result<Connection> {
                let slot = shared.checkout()?;
                Ok(Connection::new(engine, shared, slot))
            }),
            Box::new(callback),
        );
    }

    /// Sizing and usage counters.
    ///
    /// # Errors
    /// Returns `PoolClosed` once the pool has been closed.
    pub fn get_info(&self) -> Result<PoolInfo> {
        self.shared.info()
    }

    /// Close the pool.
    ///
    /// [`CloseMode::Default`] refuses with `PoolBusy` while connections are checked out;
    /// [`CloseMode::Force`] closes anyway and invalidates them, waiting only for a native call
    /// already running on one of them.
    ///
    /// # Errors
    /// `PoolBusy` as described above, `PoolClosed` when already closed.
    pub fn close(&self, mode: CloseMode) -> Result<()> {
        self.shared.close(mode)
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<TaskEngine> {
        &self.engine
    }
}
