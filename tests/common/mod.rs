#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sql_offload::prelude::*;
use tempfile::TempDir;

pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Temp directory, engine and a file-backed pool; the directory lives as long as the fixture.
pub struct Fixture {
    pub dir: TempDir,
    pub engine: Arc<TaskEngine>,
    pub pool: Pool,
}

impl Fixture {
    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("test.db")
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn fixture(min: usize, max: usize, increment: usize) -> Result<Fixture, SqlOffloadError> {
    fixture_with(|builder| builder.sizing(min, max, increment))
}

pub fn fixture_with(
    configure: impl FnOnce(PoolConfigBuilder) -> PoolConfigBuilder,
) -> Result<Fixture, SqlOffloadError> {
    init_tracing();
    let dir = tempfile::tempdir()
        .map_err(|e| SqlOffloadError::Initialization(format!("tempdir: {e}")))?;
    let path = dir.path().join("test.db");
    let engine = TaskEngine::start(EngineConfig::default().with_workers(4))?;
    let cfg = configure(PoolConfig::builder(path.to_string_lossy().into_owned())).finish();
    let pool = Pool::create(&engine, cfg)?;
    Ok(Fixture { dir, engine, pool })
}

/// Shared slot a callback can fill and the test can inspect after dispatch.
pub fn outcome_slot<T>() -> Arc<Mutex<Option<T>>> {
    Arc::new(Mutex::new(None))
}

pub fn take<T>(slot: &Arc<Mutex<Option<T>>>) -> Option<T> {
    slot.lock().unwrap().take()
}
