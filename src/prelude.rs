//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types so that a single
//! `use sql_offload::prelude::*;` is enough to create a pool and run statements.

pub use crate::connection::Connection;
pub use crate::engine::{EngineConfig, TaskEngine};
pub use crate::error::{NativeError, SqlOffloadError};
pub use crate::pool::{Pool, PoolConfig, PoolConfigBuilder, PoolInfo};
pub use crate::results::{ColumnMetadata, ExecuteOutcome, ResultTable, Row};
pub use crate::types::{CloseMode, ColumnType, Value};
