//! A checked-out database session.
//!
//! Every native call issued through a [`Connection`], synchronous or not, goes through the
//! connection's serial lane, so calls on one session never overlap and complete in the order
//! they were issued. Different connections run in parallel on the engine's workers.

pub(crate) mod statement;

use std::fmt;
use std::sync::Arc;

use crate::codec::BindValues;
use crate::engine::TaskEngine;
use crate::engine::channel::Work;
use crate::engine::lane::SerialLane;
use crate::error::{Result, SqlOffloadError};
use crate::pool::session::SessionSlot;
use crate::pool::state::PoolShared;
use crate::results::ExecuteOutcome;
use crate::types::Value;

use statement::StatementOptions;

/// One live database session lent out by a [`Pool`](crate::Pool).
///
/// Dropping a connection without [`close`](Self::close) returns the session once pending
/// operations have finished, without blocking the dropping thread.
pub struct Connection {
    engine: Arc<TaskEngine>,
    pool: Arc<PoolShared>,
    slot: Arc<SessionSlot>,
    lane: Arc<SerialLane>,
    autocommit: bool,
    prefetch_rows: Option<usize>,
    closed: bool,
}

impl Connection {
    pub(crate) fn new(engine: Arc<TaskEngine>, pool: Arc<PoolShared>, slot: Arc<SessionSlot>) -> Self {
        let lane = engine.new_lane();
        Self {
            engine,
            pool,
            slot,
            lane,
            autocommit: false,
            prefetch_rows: None,
            closed: false,
        }
    }

    fn options(&self) -> StatementOptions {
        StatementOptions {
            autocommit: self.autocommit,
            prefetch_rows: self.prefetch_rows,
        }
    }

    /// Wrap `func` so it runs against this connection's native session, or fails with
    /// `ConnectionClosed` once the connection is closed.
    fn session_work<T, F>(&self, func: F) -> Work<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
    {
        if self.closed {
            return Box::new(|| -> Result<T> { Err(SqlOffloadError::ConnectionClosed) });
        }
        let slot = Arc::clone(&self.slot);
        Box::new(move || slot.with_session(func))
    }

    fn execute_work(&self, sql: String, binds: Result<BindValues>) -> Work<ExecuteOutcome> {
        match binds {
            Ok(binds) => {
                let opts = self.options();
                self.session_work(move |conn| statement::execute(conn, &sql, &binds, opts))
            }
            Err(err) => Box::new(move || -> Result<ExecuteOutcome> { Err(err) }),
        }
    }

    /// Execute `sql` with positional `binds`, blocking until it has run after every operation
    /// issued before it.
    ///
    /// # Arguments
    ///
    /// * `sql` - One SQL statement with `?N` placeholders
    /// * `binds` - Values for the placeholders, in order
    ///
    /// # Returns
    ///
    /// The fetched rows for a result-producing statement, otherwise the affected row count
    ///
    /// # Errors
    /// `InvalidArgument` for malformed bind values, `Execution` for prepare/bind/execute/fetch
    /// failures (the connection stays usable), `ConnectionClosed` after close.
    pub fn execute(&self, sql: &str, binds: &[Value]) -> Result<ExecuteOutcome> {
        if self.closed {
            return Err(SqlOffloadError::ConnectionClosed);
        }
        let binds = BindValues::convert(binds)?;
        let work = self.execute_work(sql.to_owned(), Ok(binds));
        self.engine.call_serial(&self.lane, "execute", work)
    }

    /// Queue `sql` for execution; `callback` receives the outcome during dispatch.
    ///
    /// # Arguments
    ///
    /// * `sql` - One SQL statement with `?N` placeholders
    /// * `binds` - Values for the placeholders, in order
    /// * `callback` - Runs on the thread that next dispatches the engine's completions
    ///
    /// Bind conversion errors and closed-connection errors are delivered to `callback` in order
    /// with the connection's other outcomes.
    pub fn execute_async<F>(&self, sql: impl Into<String>, binds: Vec<Value>, callback: F)
    where
        F: FnOnce(Result<ExecuteOutcome>) + Send + 'static,
    {
        let work = self.execute_work(sql.into(), BindValues::convert(&binds));
        self.engine
            .call_serial_async(&self.lane, "execute", work, Box::new(callback));
    }

    /// Commit the open transaction.
    ///
    /// # Errors
    /// `Commit` when no transaction is active or the native commit fails.
    pub fn commit(&self) -> Result<()> {
        if self.closed {
            return Err(SqlOffloadError::ConnectionClosed);
        }
        let work = self.session_work(statement::commit);
        self.engine.call_serial(&self.lane, "commit", work)
    }

    /// Queue a commit behind every operation already issued on this connection; `callback`
    /// receives the outcome during dispatch. Fails like [`commit`](Self::commit).
    pub fn commit_async<F>(&self, callback: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let work = self.session_work(statement::commit);
        self.engine
            .call_serial_async(&self.lane, "commit", work, Box::new(callback));
    }

    /// Roll back the open transaction.
    ///
    /// # Errors
    /// `Rollback` when no transaction is active or the native rollback fails.
    pub fn rollback(&self) -> Result<()> {
        if self.closed {
            return Err(SqlOffloadError::ConnectionClosed);
        }
        let work = self.session_work(statement::rollback);
        self.engine.call_serial(&self.lane, "rollback", work)
    }

    /// Queue a rollback behind every operation already issued on this connection.
    ///
    /// # Arguments
    ///
    /// * `callback` - Receives `Ok(())`, or the error [`rollback`](Self::rollback) would return
    pub fn rollback_async<F>(&self, callback: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let work = self.session_work(statement::rollback);
        self.engine
            .call_serial_async(&self.lane, "rollback", work, Box::new(callback));
    }

    /// Applies to operations issued after this call.
    pub fn set_auto_commit(&mut self, autocommit: bool) {
        self.autocommit = autocommit;
    }

    #[must_use]
    pub fn auto_commit(&self) -> bool {
        self.autocommit
    }

    /// Set the fetch buffer hint for subsequent statements.
    ///
    /// # Errors
    /// `InvalidArgument` unless `rows` is positive; the previous value is kept.
    pub fn set_prefetch_row_count(&mut self, rows: i64) -> Result<()> {
        match usize::try_from(rows) {
            Ok(rows) if rows > 0 => {
                self.prefetch_rows = Some(rows);
                Ok(())
            }
            _ => Err(SqlOffloadError::InvalidArgument(format!(
                "prefetch row count must be positive, got {rows}"
            ))),
        }
    }

    #[must_use]
    pub fn prefetch_row_count(&self) -> Option<usize> {
        self.prefetch_rows
    }

    /// Whether the native session is still attached. Never blocks.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.closed && self.slot.is_open()
    }

    fn release_work(&self) -> Work<()> {
        let slot = Arc::clone(&self.slot);
        let pool = Arc::clone(&self.pool);
        Box::new(move || -> Result<()> {
            let native = slot.take();
            pool.release(slot.id(), native);
            Ok(())
        })
    }

    /// Return the session to its pool once every operation issued before this call has
    /// completed. Closing twice is a no-op.
    ///
    /// # Errors
    /// Currently never fails; the release runs inline if the engine has shut down.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let release = self.release_work();
        match self.engine.call_serial(&self.lane, "close", release) {
            Err(SqlOffloadError::EngineShutdown) => {
                let native = self.slot.take();
                self.pool.release(self.slot.id(), native);
                Ok(())
            }
            other => other,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            let release = self.release_work();
            self.engine
                .call_serial_detached(&self.lane, "release", release);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("session", &self.slot.id())
            .field("lane", &self.lane.id())
            .field("autocommit", &self.autocommit)
            .field("prefetch_rows", &self.prefetch_rows)
            .field("closed", &self.closed)
            .finish()
    }
}
