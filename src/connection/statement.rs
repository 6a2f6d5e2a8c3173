use crate::codec::{BindValues, build_result_table};
use crate::error::{NativeError, Result, SqlOffloadError};
use crate::results::ExecuteOutcome;

/// Session options captured when an operation is issued, so later setter calls cannot affect
/// work that is already queued.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StatementOptions {
    pub(crate) autocommit: bool,
    pub(crate) prefetch_rows: Option<usize>,
}

/// Bind, execute and (for result-producing statements) fetch every row.
///
/// Without autocommit a statement that writes opens a transaction when none is active and
/// leaves it open for `commit`/`rollback`; read-only statements never open one. With
/// autocommit any open transaction is committed after the statement.
pub(crate) fn execute(
    conn: &mut rusqlite::Connection,
    sql: &str,
    binds: &BindValues,
    opts: StatementOptions,
) -> Result<ExecuteOutcome> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| SqlOffloadError::execution(sql, e))?;

    let expected = stmt.parameter_count();
    if expected != binds.len() {
        return Err(SqlOffloadError::execution(
            sql,
            NativeError::new(
                None,
                format!(
                    "statement expects {expected} bind value(s), got {}",
                    binds.len()
                ),
            ),
        ));
    }

    // Read-only statements (plain SELECTs, a user-issued BEGIN) stay outside the implicit
    // transaction so they hold no lock once fetched.
    if !opts.autocommit && conn.is_autocommit() && !stmt.readonly() {
        conn.execute_batch("BEGIN")
            .map_err(|e| SqlOffloadError::execution(sql, e))?;
    }

    let outcome = if stmt.column_count() > 0 {
        build_result_table(&mut stmt, binds, opts.prefetch_rows).map(ExecuteOutcome::Rows)
    } else {
        stmt.execute(rusqlite::params_from_iter(binds.as_values()))
            .map(ExecuteOutcome::Affected)
    }
    .map_err(|e| SqlOffloadError::execution(sql, e))?;
    drop(stmt);

    if opts.autocommit && !conn.is_autocommit() {
        conn.execute_batch("COMMIT")
            .map_err(|e| SqlOffloadError::execution(sql, e))?;
    }
    Ok(outcome)
}

pub(crate) fn commit(conn: &mut rusqlite::Connection) -> Result<()> {
    if conn.is_autocommit() {
        return Err(SqlOffloadError::Commit(NativeError::new(
            None,
            "no transaction is active",
        )));
    }
    conn.execute_batch("COMMIT")
        .map_err(|e| SqlOffloadError::Commit(e.into()))
}

pub(crate) fn rollback(conn: &mut rusqlite::Connection) -> Result<()> {
    if conn.is_autocommit() {
        return Err(SqlOffloadError::Rollback(NativeError::new(
            None,
            "no transaction is active",
        )));
    }
    conn.execute_batch("ROLLBACK")
        .map_err(|e| SqlOffloadError::Rollback(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    const MANUAL: StatementOptions = StatementOptions {
        autocommit: false,
        prefetch_rows: None,
    };

    fn binds(values: &[Value]) -> BindValues {
        BindValues::convert(values).unwrap()
    }

    #[test]
    fn manual_mode_leaves_transaction_open() -> Result<()> {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        execute(&mut conn, "CREATE TABLE t (id INTEGER)", &binds(&[]), MANUAL)?;
        assert!(!conn.is_autocommit());
        commit(&mut conn)?;
        assert!(conn.is_autocommit());
        assert!(matches!(commit(&mut conn), Err(SqlOffloadError::Commit(_))));
        assert!(matches!(rollback(&mut conn), Err(SqlOffloadError::Rollback(_))));
        Ok(())
    }

    #[test]
    fn autocommit_closes_pending_transaction() -> Result<()> {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        execute(&mut conn, "CREATE TABLE t (id INTEGER)", &binds(&[]), MANUAL)?;
        let auto = StatementOptions {
            autocommit: true,
            prefetch_rows: None,
        };
        let outcome = execute(
            &mut conn,
            "INSERT INTO t (id) VALUES (?1)",
            &binds(&[Value::Integer(5)]),
            auto,
        )?;
        assert_eq!(outcome.affected_rows(), Some(1));
        assert!(conn.is_autocommit());
        Ok(())
    }

    #[test]
    fn bind_count_mismatch_is_an_execution_error() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = execute(&mut conn, "SELECT ?1, ?2", &binds(&[Value::Integer(1)]), MANUAL)
            .unwrap_err();
        match err {
            SqlOffloadError::Execution { sql, source } => {
                assert_eq!(sql, "SELECT ?1, ?2");
                assert_eq!(source.code, None);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(conn.is_autocommit(), "mismatch is caught before BEGIN");
    }

    #[test]
    fn reads_do_not_open_a_transaction() -> Result<()> {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER)").unwrap();
        execute(&mut conn, "SELECT COUNT(*) FROM t", &binds(&[]), MANUAL)?;
        assert!(conn.is_autocommit());
        assert!(matches!(commit(&mut conn), Err(SqlOffloadError::Commit(_))));
        Ok(())
    }

    #[test]
    fn explicit_begin_is_honoured() -> Result<()> {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        execute(&mut conn, "BEGIN", &binds(&[]), MANUAL)?;
        assert!(!conn.is_autocommit());
        execute(&mut conn, "CREATE TABLE t (id INTEGER)", &binds(&[]), MANUAL)?;
        rollback(&mut conn)?;
        assert!(conn.is_autocommit());
        let missing = execute(&mut conn, "SELECT id FROM t", &binds(&[]), MANUAL);
        assert!(matches!(missing, Err(SqlOffloadError::Execution { .. })));
        Ok(())
    }
}
