use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{NativeError, Result, SqlOffloadError};
use crate::types::CloseMode;

use super::config::{Environment, PoolConfig};
use super::session::SessionSlot;
use super::types::PoolInfo;

#[derive(Default)]
struct PoolState {
    /// Parked sessions, reused LIFO.
    idle: Vec<rusqlite::Connection>,
    /// Sessions alive: idle plus checked out.
    open: usize,
    /// Slots reserved by checkouts currently opening sessions without the lock.
    opening: usize,
    checked_out: HashMap<u64, Arc<SessionSlot>>,
    closed: bool,
}

/// Pool bookkeeping shared by the `Pool` handle, its connections and in-flight checkouts.
///
/// The state mutex is only held for bookkeeping; opening a native session and rolling back a
/// returned one always happen with it released.
pub(crate) struct PoolShared {
    env: Environment,
    min: usize,
    max: usize,
    increment: usize,
    queue_timeout: Duration,
    state: Mutex<PoolState>,
    available: Condvar,
    next_session_id: AtomicU64,
}

impl PoolShared {
    /// Validate the config and open the initial `pool_min` sessions.
    pub(crate) fn create(cfg: &PoolConfig) -> Result<Arc<Self>> {
        cfg.validate()?;
        let env = Environment::from_config(cfg);
        let mut idle = Vec::with_capacity(cfg.pool_min);
        for _ in 0..cfg.pool_min {
            let conn = env.open_session().map_err(|err| {
                SqlOffloadError::Initialization(format!(
                    "failed to open session for {}: {err}",
                    env.location()
                ))
            })?;
            idle.push(conn);
        }
        let open = idle.len();
        Ok(Arc::new(Self {
            env,
            min: cfg.pool_min,
            max: cfg.pool_max,
            increment: cfg.pool_increment,
            queue_timeout: cfg.queue_timeout(),
            state: Mutex::new(PoolState {
                idle,
                open,
                ..PoolState::default()
            }),
            available: Condvar::new(),
            next_session_id: AtomicU64::new(1),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, state: &mut PoolState, native: rusqlite::Connection) -> Arc<SessionSlot> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(SessionSlot::new(id, native));
        state.checked_out.insert(id, Arc::clone(&slot));
        slot
    }

    /// Hand out a session, growing the pool or waiting up to the queue timeout when none is
    /// idle.
    pub(crate) fn checkout(&self) -> Result<Arc<SessionSlot>> {
        let started = Instant::now();
        let deadline = started + self.queue_timeout;
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(SqlOffloadError::PoolClosed);
            }
            if let Some(native) = state.idle.pop() {
                let slot = self.register(&mut state, native);
                tracing::debug!(session = slot.id(), "session checked out from idle");
                return Ok(slot);
            }

            let headroom = self.max.saturating_sub(state.open + state.opening);
            if headroom > 0 {
                let batch = self.increment.min(headroom);
                state.opening += batch;
                drop(state);
                return self.grow(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(SqlOffloadError::PoolExhausted {
                    waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                });
            }
            let (guard, _) = self
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Open `batch` reserved sessions without the lock, hand out the first and park the rest.
    fn grow(&self, batch: usize) -> Result<Arc<SessionSlot>> {
        let mut opened = Vec::with_capacity(batch);
        let mut first_error: Option<NativeError> = None;
        for _ in 0..batch {
            match self.env.open_session() {
                Ok(conn) => opened.push(conn),
                Err(err) => {
                    tracing::warn!(location = %self.env.location(), error = %err, "failed to open session");
                    first_error.get_or_insert(err);
                }
            }
        }

        let mut state = self.lock();
        state.opening -= batch;
        if state.closed {
            drop(state);
            self.available.notify_all();
            return Err(SqlOffloadError::PoolClosed);
        }
        state.open += opened.len();
        let mut opened = opened.into_iter();
        let Some(first) = opened.next() else {
            drop(state);
            self.available.notify_all();
            let message = first_error.map_or_else(
                || "no session could be opened".to_owned(),
                |err| err.to_string(),
            );
            return Err(SqlOffloadError::Connection(message));
        };
        state.idle.extend(opened);
        let slot = self.register(&mut state, first);
        let open = state.open;
        drop(state);
        self.available.notify_all();
        tracing::debug!(session = slot.id(), open, "session checked out after growth");
        Ok(slot)
    }

    /// Return a session lent out under `id`. A session that still holds a transaction is rolled
    /// back first; one that cannot be rolled back, or that comes back to a closed pool, is
    /// destroyed.
    pub(crate) fn release(&self, id: u64, native: Option<rusqlite::Connection>) {
        let native = native.and_then(|conn| {
            if conn.is_autocommit() {
                return Some(conn);
            }
            match conn.execute_batch("ROLLBACK") {
                Ok(()) => Some(conn),
                Err(err) => {
                    tracing::warn!(session = id, error = %err, "rollback on release failed; dropping session");
                    None
                }
            }
        });

        let mut state = self.lock();
        if state.checked_out.remove(&id).is_none() {
            // Already detached by a forced close.
            return;
        }
        let destroyed = match native {
            Some(conn) if !state.closed => {
                state.idle.push(conn);
                None
            }
            other => {
                state.open = state.open.saturating_sub(1);
                other
            }
        };
        drop(state);
        self.available.notify_one();
        drop(destroyed);
        tracing::debug!(session = id, "session released");
    }

    pub(crate) fn info(&self) -> Result<PoolInfo> {
        let state = self.lock();
        if state.closed {
            return Err(SqlOffloadError::PoolClosed);
        }
        Ok(PoolInfo {
            busy_count: state.checked_out.len(),
            open_count: state.open,
            min: self.min,
            max: self.max,
            increment: self.increment,
        })
    }

    pub(crate) fn close(&self, mode: CloseMode) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(SqlOffloadError::PoolClosed);
        }
        let busy = state.checked_out.len();
        if mode == CloseMode::Default && busy > 0 {
            return Err(SqlOffloadError::PoolBusy { busy });
        }
        state.closed = true;
        let idle = std::mem::take(&mut state.idle);
        let lent: Vec<Arc<SessionSlot>> = state.checked_out.drain().map(|(_, slot)| slot).collect();
        state.open = state.open.saturating_sub(idle.len() + lent.len());
        drop(state);
        self.available.notify_all();

        drop(idle);
        for slot in lent {
            tracing::warn!(session = slot.id(), "invalidating checked-out session on forced close");
            drop(slot.take());
        }
        tracing::info!(location = %self.env.location(), ?mode, "pool closed");
        Ok(())
    }
}

impl std::fmt::Debug for PoolShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolShared")
            .field("location", &self.env.location())
            .field("min", &self.min)
            .field("max", &self.max)
            .field("increment", &self.increment)
            .finish_non_exhaustive()
    }
}
