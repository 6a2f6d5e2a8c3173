use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Result, SqlOffloadError};

/// One checked-out native session, exclusively owned by a single `Connection`.
///
/// The pool keeps a handle to every slot it has lent out so a forced close can take the native
/// session away; afterwards every operation on the slot reports `ConnectionClosed`.
pub(crate) struct SessionSlot {
    id: u64,
    native: Mutex<Option<rusqlite::Connection>>,
    open: AtomicBool,
}

impl SessionSlot {
    pub(crate) fn new(id: u64, native: rusqlite::Connection) -> Self {
        Self {
            id,
            native: Mutex::new(Some(native)),
            open: AtomicBool::new(true),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, Option<rusqlite::Connection>> {
        self.native.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `func` against the native session.
    ///
    /// # Errors
    /// Returns [`SqlOffloadError::ConnectionClosed`] when the session was released or
    /// invalidated, otherwise whatever `func` returns.
    pub(crate) fn with_session<R>(
        &self,
        func: impl FnOnce(&mut rusqlite::Connection) -> Result<R>,
    ) -> Result<R> {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(conn) => func(conn),
            None => Err(SqlOffloadError::ConnectionClosed),
        }
    }

    /// Remove the native session. Waits for an in-flight native call on it to finish.
    pub(crate) fn take(&self) -> Option<rusqlite::Connection> {
        let mut guard = self.lock();
        self.open.store(false, Ordering::Release);
        guard.take()
    }

    /// Whether the native session is still attached. Never blocks.
    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for SessionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSlot")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}
