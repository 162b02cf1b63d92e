//! Statement execution against connections obtained from a
//! [`ConnectionProvider`].
//!
//! Every operation acquires its own connection, runs inside a transaction the
//! executor opens when the connection is in auto-commit mode, and closes or
//! releases the connection before returning. Failures are reported as data
//! (`false`, `None`, [`NOT_INITIALIZED`]) after the exception handler has
//! seen them.

mod rows;
mod statement;

use std::sync::{Arc, PoisonError, RwLock};

use rusqlite::Connection;
use rusqlite::types::Value;

use crate::callbacks::{
    GeneratedKeysCallback, NOT_INITIALIZED, SingleGeneratedKey, UpdatedRowCountCallback,
};
use crate::error::TxnMiddlewareError;
use crate::handlers::{ExceptionHandler, LoggingExceptionHandler, invoke_exception_handler};
use crate::params::PreparedStatementDataProvider;
use crate::placeholders::count_placeholders;
use crate::provider::{ConnectionProvider, ProvidedConnection};
use crate::results::ResultRow;
use crate::types::RowValues;

pub(crate) use rows::{collect_rows, first_count, for_each_row};
pub(crate) use statement::{StatementOutcome, run_statement, to_sqlite_values};

/// A connection on loan for one executor call.
///
/// Dropping the lease rolls back a transaction the executor opened and then
/// closes or releases the connection, on every exit path including unwinds.
struct LeasedConnection {
    conn: Option<ProvidedConnection>,
    close: bool,
    opened_transaction: bool,
}

impl LeasedConnection {
    fn new(conn: ProvidedConnection, close: bool) -> Self {
        Self {
            conn: Some(conn),
            close,
            opened_transaction: false,
        }
    }

    fn connection(&self) -> Result<&Connection, TxnMiddlewareError> {
        self.conn.as_deref().ok_or_else(|| {
            TxnMiddlewareError::ConnectionError("connection already released".into())
        })
    }

    fn run<T, F>(&mut self, work: F) -> Result<T, TxnMiddlewareError>
    where
        F: FnOnce(&Connection) -> Result<T, TxnMiddlewareError>,
    {
        if self.connection()?.is_autocommit() {
            self.connection()?.execute_batch("BEGIN")?;
            self.opened_transaction = true;
        }
        let value = work(self.connection()?)?;
        if self.opened_transaction {
            self.connection()?.execute_batch("COMMIT")?;
            self.opened_transaction = false;
        }
        Ok(value)
    }

    fn rollback(&mut self) {
        if !self.opened_transaction {
            return;
        }
        self.opened_transaction = false;
        if let Some(conn) = &self.conn
            && !conn.is_autocommit()
            && let Err(err) = conn.execute_batch("ROLLBACK")
        {
            tracing::warn!("rollback failed: {err}");
        }
    }
}

impl Drop for LeasedConnection {
    fn drop(&mut self) {
        self.rollback();
        if let Some(conn) = self.conn.take() {
            if self.close {
                conn.close();
            } else {
                conn.release();
            }
        }
    }
}

/// Check a data provider against the statement and convert its values.
///
/// # Panics
/// Panics if the placeholder count of `sql` differs from the provider's
/// `value_count`, or if `ordered_values` returns a different number of values.
fn checked_values<D>(sql: &str, data: &D) -> Vec<Value>
where
    D: PreparedStatementDataProvider + ?Sized,
{
    let expected = count_placeholders(sql);
    let count = data.value_count();
    assert!(
        expected == count,
        "statement expects {expected} parameters but the data provider declares {count}: {sql}"
    );
    let values = data.ordered_values();
    assert!(
        values.len() == count,
        "data provider declared {count} values but supplied {}",
        values.len()
    );
    to_sqlite_values(&values)
}

/// Runs SQL against connections from a [`ConnectionProvider`].
///
/// ```rust,no_run
/// use txn_middleware::prelude::*;
///
/// let executor = DbExecutor::new(DirectConnectionProvider::new(SqliteOptions::new("app.db")));
/// assert!(executor.execute_statement("CREATE TABLE IF NOT EXISTS t (id INTEGER PRIMARY KEY, v TEXT)"));
/// let inserted = executor.insert_or_update_or_delete(
///     "INSERT INTO t (v) VALUES (?)",
///     &vec![RowValues::Text("hello".into())],
/// );
/// assert_eq!(inserted, 1);
/// assert_eq!(executor.query_count("SELECT count(*) FROM t"), 1);
/// ```
pub struct DbExecutor<P: ConnectionProvider> {
    provider: P,
    exception_handler: RwLock<Arc<dyn ExceptionHandler>>,
}

impl<P: ConnectionProvider> DbExecutor<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            exception_handler: RwLock::new(Arc::new(LoggingExceptionHandler)),
        }
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Replace the handler that sees every failed call.
    pub fn set_exception_handler(&self, handler: impl ExceptionHandler + 'static) {
        *self
            .exception_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(handler);
    }

    #[must_use]
    pub fn exception_handler(&self) -> Arc<dyn ExceptionHandler> {
        Arc::clone(
            &self
                .exception_handler
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Acquire a connection, run `work` inside a transaction and give the
    /// connection back. `None` means the call failed; the failure has already
    /// been logged or handed to the exception handler.
    fn with_connection_do<T, F>(&self, sql: &str, work: F) -> Option<T>
    where
        F: FnOnce(&Connection) -> Result<T, TxnMiddlewareError>,
    {
        let Some(conn) = self.provider.get_connection() else {
            tracing::error!("no connection available to run: {sql}");
            return None;
        };
        let mut lease = LeasedConnection::new(conn, self.provider.should_close_connection());
        match lease.run(work) {
            Ok(value) => Some(value),
            Err(err) => {
                let handler = self.exception_handler();
                invoke_exception_handler(handler.as_ref(), &err);
                lease.rollback();
                None
            }
        }
    }

    fn run_update(&self, sql: &str, params: &[Value]) -> Option<StatementOutcome> {
        tracing::debug!(params = params.len(), "executing: {sql}");
        self.with_connection_do(sql, |conn| run_statement(conn, sql, params))
    }

    fn run_query<F>(&self, sql: &str, params: &[Value], mut on_row: F) -> bool
    where
        F: FnMut(&ResultRow),
    {
        tracing::debug!(params = params.len(), "querying: {sql}");
        self.with_connection_do(sql, |conn| {
            for_each_row(conn, sql, params, |row| {
                on_row(row);
                Ok(())
            })
        })
        .is_some()
    }

    fn run_count(&self, sql: &str, params: &[Value]) -> i64 {
        tracing::debug!(params = params.len(), "counting: {sql}");
        self.with_connection_do(sql, |conn| first_count(conn, sql, params))
            .flatten()
            .unwrap_or(NOT_INITIALIZED)
    }

    /// Execute a statement without parameters.
    #[must_use = "false means the statement failed"]
    pub fn execute_statement(&self, sql: &str) -> bool {
        self.run_update(sql, &[]).is_some()
    }

    /// Execute a statement without parameters and report generated keys.
    #[must_use = "false means the statement failed"]
    pub fn execute_statement_with_keys(
        &self,
        sql: &str,
        keys: &mut dyn GeneratedKeysCallback,
    ) -> bool {
        match self.run_update(sql, &[]) {
            Some(outcome) => {
                keys.on_generated_keys(outcome.generated_keys);
                true
            }
            None => false,
        }
    }

    /// Execute a prepared statement.
    ///
    /// # Panics
    /// Panics if `data` does not match the statement's placeholders.
    #[must_use = "false means the statement failed"]
    pub fn execute_prepared_statement<D>(&self, sql: &str, data: &D) -> bool
    where
        D: PreparedStatementDataProvider + ?Sized,
    {
        self.execute_prepared_statement_with(sql, data, None, None)
    }

    /// Execute a prepared statement, reporting the updated row count and
    /// generated keys to the given callbacks after the commit succeeded.
    ///
    /// # Panics
    /// Panics if `data` does not match the statement's placeholders.
    #[must_use = "false means the statement failed"]
    pub fn execute_prepared_statement_with<D>(
        &self,
        sql: &str,
        data: &D,
        row_count: Option<&mut dyn UpdatedRowCountCallback>,
        keys: Option<&mut dyn GeneratedKeysCallback>,
    ) -> bool
    where
        D: PreparedStatementDataProvider + ?Sized,
    {
        let params = checked_values(sql, data);
        let Some(outcome) = self.run_update(sql, &params) else {
            return false;
        };
        if let Some(cb) = row_count {
            cb.set_updated_row_count(outcome.updated_rows);
        }
        if let Some(cb) = keys {
            cb.on_generated_keys(outcome.generated_keys);
        }
        true
    }

    /// Execute an insert and return its single generated key, `None` if the
    /// statement failed.
    ///
    /// # Panics
    /// Panics if `data` does not match the statement's placeholders, or if the
    /// statement did not generate exactly one key.
    #[must_use]
    pub fn execute_prepared_statement_and_get_generated_key<D>(
        &self,
        sql: &str,
        data: &D,
    ) -> Option<RowValues>
    where
        D: PreparedStatementDataProvider + ?Sized,
    {
        let mut key = SingleGeneratedKey::new();
        if self.execute_prepared_statement_with(sql, data, None, Some(&mut key)) {
            key.into_key()
        } else {
            None
        }
    }

    /// Execute a DML statement and return the number of changed rows, or
    /// [`NOT_INITIALIZED`] if it failed.
    ///
    /// # Panics
    /// Panics if `data` does not match the statement's placeholders.
    #[must_use]
    pub fn insert_or_update_or_delete<D>(&self, sql: &str, data: &D) -> i64
    where
        D: PreparedStatementDataProvider + ?Sized,
    {
        let params = checked_values(sql, data);
        self.run_update(sql, &params)
            .map_or(NOT_INITIALIZED, |outcome| outcome.updated_rows)
    }

    /// Like [`insert_or_update_or_delete`](Self::insert_or_update_or_delete),
    /// also reporting generated keys.
    ///
    /// # Panics
    /// Panics if `data` does not match the statement's placeholders.
    #[must_use]
    pub fn insert_or_update_or_delete_with_keys<D>(
        &self,
        sql: &str,
        data: &D,
        keys: &mut dyn GeneratedKeysCallback,
    ) -> i64
    where
        D: PreparedStatementDataProvider + ?Sized,
    {
        let mut count = NOT_INITIALIZED;
        let mut set_count = |n: i64| count = n;
        if self.execute_prepared_statement_with(sql, data, Some(&mut set_count), Some(keys)) {
            count
        } else {
            NOT_INITIALIZED
        }
    }

    /// Execute an insert and return the changed row count with the single
    /// generated key; `(NOT_INITIALIZED, None)` if the statement failed.
    ///
    /// # Panics
    /// Panics if `data` does not match the statement's placeholders, or if the
    /// statement did not generate exactly one key.
    #[must_use]
    pub fn insert_or_update_and_get_generated_key<D>(
        &self,
        sql: &str,
        data: &D,
    ) -> (i64, Option<RowValues>)
    where
        D: PreparedStatementDataProvider + ?Sized,
    {
        let mut key = SingleGeneratedKey::new();
        let count = self.insert_or_update_or_delete_with_keys(sql, data, &mut key);
        if count == NOT_INITIALIZED {
            (NOT_INITIALIZED, None)
        } else {
            (count, key.into_key())
        }
    }

    /// Run a query and call `on_row` for every row in cursor order.
    ///
    /// The row is reused for the next step; clone it to keep it.
    #[must_use = "false means the query failed"]
    pub fn query_all_with<F>(&self, sql: &str, on_row: F) -> bool
    where
        F: FnMut(&ResultRow),
    {
        self.run_query(sql, &[], on_row)
    }

    /// Prepared form of [`query_all_with`](Self::query_all_with).
    ///
    /// # Panics
    /// Panics if `data` does not match the statement's placeholders.
    #[must_use = "false means the query failed"]
    pub fn query_all_prepared_with<D, F>(&self, sql: &str, data: &D, on_row: F) -> bool
    where
        D: PreparedStatementDataProvider + ?Sized,
        F: FnMut(&ResultRow),
    {
        let params = checked_values(sql, data);
        self.run_query(sql, &params, on_row)
    }

    /// Run a query and collect all rows; `None` if it failed.
    #[must_use]
    pub fn query_all(&self, sql: &str) -> Option<Vec<ResultRow>> {
        tracing::debug!("querying: {sql}");
        self.with_connection_do(sql, |conn| collect_rows(conn, sql, &[]))
    }

    /// Prepared form of [`query_all`](Self::query_all).
    ///
    /// # Panics
    /// Panics if `data` does not match the statement's placeholders.
    #[must_use]
    pub fn query_all_prepared<D>(&self, sql: &str, data: &D) -> Option<Vec<ResultRow>>
    where
        D: PreparedStatementDataProvider + ?Sized,
    {
        let params = checked_values(sql, data);
        tracing::debug!(params = params.len(), "querying: {sql}");
        self.with_connection_do(sql, |conn| collect_rows(conn, sql, &params))
    }

    /// Run a query expected to return at most one row.
    ///
    /// Returns `None` for no rows or a failed query.
    ///
    /// # Panics
    /// Panics if the query returns more than one row.
    #[must_use]
    pub fn query_single(&self, sql: &str) -> Option<ResultRow> {
        single_row(sql, self.query_all(sql)?)
    }

    /// Prepared form of [`query_single`](Self::query_single).
    ///
    /// # Panics
    /// Panics if `data` does not match the statement's placeholders, or if the
    /// query returns more than one row.
    #[must_use]
    pub fn query_single_prepared<D>(&self, sql: &str, data: &D) -> Option<ResultRow>
    where
        D: PreparedStatementDataProvider + ?Sized,
    {
        single_row(sql, self.query_all_prepared(sql, data)?)
    }

    /// Run a counting query and return the first column of the first row.
    ///
    /// NULL counts as zero. Returns [`NOT_INITIALIZED`] if the query failed or
    /// returned no rows.
    #[must_use]
    pub fn query_count(&self, sql: &str) -> i64 {
        self.run_count(sql, &[])
    }

    /// Prepared form of [`query_count`](Self::query_count).
    ///
    /// # Panics
    /// Panics if `data` does not match the statement's placeholders.
    #[must_use]
    pub fn query_count_prepared<D>(&self, sql: &str, data: &D) -> i64
    where
        D: PreparedStatementDataProvider + ?Sized,
    {
        let params = checked_values(sql, data);
        self.run_count(sql, &params)
    }
}

fn single_row(sql: &str, mut rows: Vec<ResultRow>) -> Option<ResultRow> {
    assert!(
        rows.len() <= 1,
        "query_single expected at most one row but got {}: {sql}",
        rows.len()
    );
    rows.pop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{DirectConnectionProvider, PooledConnectionProvider};

    #[test]
    fn lease_rolls_back_on_drop() -> Result<(), Box<dyn std::error::Error>> {
        let conn = ProvidedConnection::Dedicated(Connection::open_in_memory()?);
        let mut lease = LeasedConnection::new(conn, false);
        let err = lease.run(|conn| {
            conn.execute_batch("CREATE TABLE t (id INTEGER)")?;
            Err::<(), _>(TxnMiddlewareError::Other("boom".into()))
        });
        assert!(err.is_err());
        assert!(lease.opened_transaction);
        lease.rollback();
        assert!(lease.connection()?.is_autocommit());
        Ok(())
    }

    #[test]
    fn mismatched_provider_values_panic() {
        struct Liar;
        impl PreparedStatementDataProvider for Liar {
            fn value_count(&self) -> usize {
                1
            }
            fn ordered_values(&self) -> Vec<RowValues> {
                Vec::new()
            }
        }
        let result = std::panic::catch_unwind(|| checked_values("SELECT ?", &Liar));
        assert!(result.is_err());
    }

    #[test]
    fn executor_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DbExecutor<DirectConnectionProvider>>();
        assert_send_sync::<DbExecutor<PooledConnectionProvider>>();
    }
}
