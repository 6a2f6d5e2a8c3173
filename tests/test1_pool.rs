mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::{DISPATCH_TIMEOUT, fixture, fixture_with, outcome_slot, take};
use sql_offload::prelude::*;

#[test]
fn pool_opens_min_sessions_and_reports_info() -> Result<(), SqlOffloadError> {
    let fx = fixture(1, 3, 1)?;
    let info = fx.pool.get_info()?;
    assert_eq!(
        info,
        PoolInfo {
            busy_count: 0,
            open_count: 1,
            min: 1,
            max: 3,
            increment: 1,
        }
    );

    let conn = fx.pool.get_connection()?;
    let info = fx.pool.get_info()?;
    assert_eq!(info.busy_count, 1);
    assert_eq!(info.open_count, 1, "idle session is reused before growing");

    let second = fx.pool.get_connection()?;
    assert_eq!(fx.pool.get_info()?.open_count, 2);
    drop(second);
    drop(conn);
    assert_eq!(fx.pool.get_info()?.busy_count, 0);
    Ok(())
}

#[test]
fn growth_opens_increment_sessions_at_once() -> Result<(), SqlOffloadError> {
    let fx = fixture(0, 5, 3)?;
    assert_eq!(fx.pool.get_info()?.open_count, 0);
    let _conn = fx.pool.get_connection()?;
    let info = fx.pool.get_info()?;
    assert_eq!(info.open_count, 3);
    assert_eq!(info.busy_count, 1);
    Ok(())
}

#[test]
fn third_checkout_fails_when_pool_is_exhausted() -> Result<(), SqlOffloadError> {
    let fx = fixture_with(|b| b.sizing(1, 2, 1).queue_timeout(Duration::from_millis(50)))?;
    let _first = fx.pool.get_connection()?;
    let _second = fx.pool.get_connection()?;

    let started = Instant::now();
    match fx.pool.get_connection() {
        Err(SqlOffloadError::PoolExhausted { waited_ms }) => {
            assert!(waited_ms >= 50);
            assert!(started.elapsed() >= Duration::from_millis(50));
        }
        other => panic!("expected PoolExhausted, got {other:?}"),
    }
    Ok(())
}

#[test]
fn zero_queue_timeout_fails_immediately() -> Result<(), SqlOffloadError> {
    let fx = fixture_with(|b| b.sizing(0, 1, 1).queue_timeout(Duration::ZERO))?;
    let _held = fx.pool.get_connection()?;
    assert!(matches!(
        fx.pool.get_connection(),
        Err(SqlOffloadError::PoolExhausted { .. })
    ));
    Ok(())
}

#[test]
fn waiting_checkout_gets_released_session() -> Result<(), SqlOffloadError> {
    let fx = fixture_with(|b| b.sizing(1, 2, 1).queue_timeout(Duration::from_secs(5)))?;
    let first = fx.pool.get_connection()?;
    let _second = fx.pool.get_connection()?;

    let releaser = thread::spawn(move || {
        let mut first = first;
        thread::sleep(Duration::from_millis(50));
        first.close()
    });

    let third = fx.pool.get_connection()?;
    assert!(third.is_connected());
    releaser.join().expect("releaser thread")?;
    assert_eq!(fx.pool.get_info()?.open_count, 2);
    Ok(())
}

#[test]
fn async_checkout_delivers_on_dispatch() -> Result<(), SqlOffloadError> {
    let fx = fixture(0, 2, 1)?;
    let slot = outcome_slot();
    let sink = slot.clone();
    fx.pool
        .get_connection_async(move |res| *sink.lock().unwrap() = Some(res));

    fx.engine.run_until_idle(DISPATCH_TIMEOUT);
    assert_eq!(fx.engine.in_flight(), 0);
    let conn = take(&slot).expect("callback ran")?;
    assert!(conn.is_connected());
    assert_eq!(fx.pool.get_info()?.busy_count, 1);
    Ok(())
}

#[test]
fn default_close_refuses_while_connections_are_out() -> Result<(), SqlOffloadError> {
    let fx = fixture(1, 2, 1)?;
    let mut conn = fx.pool.get_connection()?;

    match fx.pool.close(CloseMode::Default) {
        Err(SqlOffloadError::PoolBusy { busy }) => assert_eq!(busy, 1),
        other => panic!("expected PoolBusy, got {other:?}"),
    }
    // Still open and usable.
    assert_eq!(fx.pool.get_info()?.busy_count, 1);

    conn.close()?;
    fx.pool.close(CloseMode::Default)?;

    assert!(matches!(fx.pool.get_info(), Err(SqlOffloadError::PoolClosed)));
    assert!(matches!(fx.pool.get_connection(), Err(SqlOffloadError::PoolClosed)));
    assert!(matches!(
        fx.pool.close(CloseMode::Force),
        Err(SqlOffloadError::PoolClosed)
    ));
    Ok(())
}

#[test]
fn force_close_invalidates_outstanding_connections() -> Result<(), SqlOffloadError> {
    let fx = fixture(1, 2, 1)?;
    let mut conn = fx.pool.get_connection()?;
    conn.execute("SELECT 1", &[])?;

    fx.pool.close(CloseMode::Force)?;

    assert!(!conn.is_connected());
    assert!(matches!(
        conn.execute("SELECT 1", &[]),
        Err(SqlOffloadError::ConnectionClosed)
    ));
    // Closing an invalidated connection is still quiet.
    conn.close()?;
    conn.close()?;
    Ok(())
}

#[test]
fn async_checkout_after_close_reports_pool_closed() -> Result<(), SqlOffloadError> {
    let fx = fixture(0, 1, 1)?;
    fx.pool.close(CloseMode::Default)?;
    let slot = outcome_slot();
    let sink = slot.clone();
    fx.pool
        .get_connection_async(move |res| *sink.lock().unwrap() = Some(res.map(|_| ())));
    fx.engine.run_until_idle(DISPATCH_TIMEOUT);
    assert!(matches!(take(&slot), Some(Err(SqlOffloadError::PoolClosed))));
    Ok(())
}

#[test]
fn returned_session_has_its_transaction_rolled_back() -> Result<(), SqlOffloadError> {
    let fx = fixture(0, 1, 1)?;
    let mut conn = fx.pool.get_connection()?;
    conn.execute("CREATE TABLE t (id INTEGER)", &[])?;
    conn.commit()?;
    conn.execute("INSERT INTO t (id) VALUES (1)", &[])?;
    conn.close()?;

    let conn = fx.pool.get_connection()?;
    let rows = conn
        .execute("SELECT COUNT(*) AS cnt FROM t", &[])?
        .into_table()
        .expect("select returns rows");
    assert_eq!(rows.get(0, "cnt"), Some(&Value::Integer(0)));
    Ok(())
}

#[test]
fn read_only_pool_on_missing_file_fails_to_initialize() -> Result<(), SqlOffloadError> {
    common::init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("missing.db");
    let engine = TaskEngine::start(EngineConfig::default().with_workers(1))?;
    let cfg = PoolConfig::builder(missing.to_string_lossy().into_owned())
        .sizing(1, 1, 1)
        .read_only(true)
        .finish();
    assert!(matches!(
        Pool::create(&engine, cfg),
        Err(SqlOffloadError::Initialization(_))
    ));

    let bad_sizing = PoolConfig::builder("unused.db").sizing(2, 1, 1).finish();
    assert!(matches!(
        Pool::create(&engine, bad_sizing),
        Err(SqlOffloadError::Initialization(_))
    ));
    Ok(())
}

#[test]
fn pool_from_json_config() -> Result<(), SqlOffloadError> {
    common::init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("json.db");
    let json = serde_json::json!({
        "connectString": path.to_string_lossy(),
        "username": "scott",
        "password": "tiger",
        "poolMin": 1,
        "poolMax": 2,
        "poolIncrement": 1,
        "walJournal": true
    })
    .to_string();
    let engine = TaskEngine::start(EngineConfig::default().with_workers(1))?;
    let pool = Pool::create(&engine, PoolConfig::from_json(&json)?)?;
    let info = pool.get_info()?;
    assert_eq!((info.min, info.max, info.open_count), (1, 2, 1));
    Ok(())
}
