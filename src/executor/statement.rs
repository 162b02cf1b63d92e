use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};

use crate::error::TxnMiddlewareError;
use crate::placeholders::{changes_rows, inserts_rows};
use crate::types::RowValues;

/// What a non-query statement reported after running.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StatementOutcome {
    pub(crate) updated_rows: i64,
    pub(crate) generated_keys: Vec<Vec<RowValues>>,
}

pub(crate) fn to_sqlite_values(values: &[RowValues]) -> Vec<Value> {
    values.iter().map(RowValues::to_sqlite_value).collect()
}

/// Run one statement to completion.
///
/// Any result rows are stepped through and discarded. Read-only statements
/// and DDL report zero updated rows. For an `INSERT`/`REPLACE` that changed
/// rows the generated keys are `[[last_insert_rowid]]`, otherwise empty.
///
/// # Errors
/// Returns `TxnMiddlewareError` if preparing, binding or stepping fails.
pub(crate) fn run_statement(
    conn: &Connection,
    sql: &str,
    params: &[Value],
) -> Result<StatementOutcome, TxnMiddlewareError> {
    let mut stmt = conn.prepare(sql)?;
    let read_only = stmt.readonly();
    {
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        while rows.next()?.is_some() {}
    }

    let updated_rows = if read_only || !changes_rows(sql) {
        0
    } else {
        i64::try_from(conn.changes()).unwrap_or(i64::MAX)
    };
    let generated_keys = if updated_rows > 0 && inserts_rows(sql) {
        vec![vec![RowValues::Int(conn.last_insert_rowid())]]
    } else {
        Vec::new()
    };
    Ok(StatementOutcome {
        updated_rows,
        generated_keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_report_count_and_rowid() -> Result<(), Box<dyn std::error::Error>> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")?;

        let out = run_statement(
            &conn,
            "INSERT INTO t (v) VALUES (?), (?)",
            &to_sqlite_values(&[RowValues::from("a"), RowValues::from("b")]),
        )?;
        assert_eq!(out.updated_rows, 2);
        assert_eq!(out.generated_keys, vec![vec![RowValues::Int(2)]]);

        let out = run_statement(&conn, "UPDATE t SET v = 'z' WHERE id = 1", &[])?;
        assert_eq!(out.updated_rows, 1);
        assert!(out.generated_keys.is_empty());

        let out = run_statement(&conn, "CREATE TABLE u (id INTEGER)", &[])?;
        assert_eq!(out.updated_rows, 0);
        Ok(())
    }

    #[test]
    fn selects_report_no_updates() -> Result<(), Box<dyn std::error::Error>> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1), (2);")?;
        let out = run_statement(&conn, "SELECT id FROM t", &[])?;
        assert_eq!(out.updated_rows, 0);
        assert!(out.generated_keys.is_empty());
        Ok(())
    }

    #[test]
    fn wrong_bind_count_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("CREATE TABLE t (id INTEGER)")?;
        assert!(run_statement(&conn, "INSERT INTO t VALUES (?)", &[]).is_err());
        Ok(())
    }
}
