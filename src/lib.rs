//! Drive blocking `SQLite` sessions from a single caller thread.
//!
//! A [`TaskEngine`] runs the blocking native calls on a bounded set of worker threads. A
//! [`Pool`] lends out [`Connection`]s. Every operation comes in two forms:
//!
//! - synchronous (`execute`, `commit`, `get_connection`, ...) blocks the caller and returns
//!   the outcome directly;
//! - asynchronous (`execute_async`, `commit_async`, `get_connection_async`, ...) returns at
//!   once and hands the outcome to a callback the next time the caller dispatches completions
//!   with [`TaskEngine::run_pending`], [`TaskEngine::wait_and_run`] or
//!   [`TaskEngine::run_until_idle`].
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use sql_offload::prelude::*;
//!
//! # fn demo() -> Result<(), SqlOffloadError> {
//! let engine = TaskEngine::start(EngineConfig::default())?;
//! let pool = Pool::create(
//!     &engine,
//!     PoolConfig::builder("app.db").sizing(1, 4, 1).finish(),
//! )?;
//!
//! let mut conn = pool.get_connection()?;
//! conn.set_auto_commit(true);
//! conn.execute("CREATE TABLE IF NOT EXISTS t (id INTEGER, name TEXT)", &[])?;
//! conn.execute_async(
//!     "INSERT INTO t (id, name) VALUES (?1, ?2)",
//!     vec![Value::Integer(1), Value::String("alice".into())],
//!     |res| println!("inserted: {:?}", res.map(|o| o.affected_rows())),
//! );
//! engine.run_until_idle(Duration::from_secs(5));
//!
//! conn.close()?;
//! pool.close(CloseMode::Default)?;
//! engine.shutdown();
//! # Ok(()) }
//! ```

pub mod codec;
pub mod connection;
pub mod engine;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod results;
pub mod types;

pub use connection::Connection;
pub use engine::{EngineConfig, TaskEngine};
pub use error::{NativeError, Result, SqlOffloadError};
pub use pool::{Pool, PoolConfig, PoolConfigBuilder, PoolInfo};
pub use results::{ColumnMetadata, ExecuteOutcome, ResultTable, Row};
pub use types::{CloseMode, ColumnType, Value};
