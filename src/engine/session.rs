use std::cell::RefCell;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::TxnMiddlewareError;
use crate::executor::{collect_rows, first_count, for_each_row, run_statement, to_sqlite_values};
use crate::params::PreparedStatementDataProvider;
use crate::provider::SqliteOptions;
use crate::results::ResultRow;

const ROLLBACK_BUSY_RETRIES: &[Duration] = &[
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
];

/// Transaction control of a persistence session.
pub trait Session {
    fn is_transaction_active(&self) -> bool;

    /// # Errors
    /// Returns `TxnMiddlewareError` if the transaction cannot be started.
    fn begin_transaction(&mut self) -> Result<(), TxnMiddlewareError>;

    /// # Errors
    /// Returns `TxnMiddlewareError` if committing fails or nothing is active.
    fn commit_transaction(&mut self) -> Result<(), TxnMiddlewareError>;

    /// # Errors
    /// Returns `TxnMiddlewareError` if rolling back fails or nothing is active.
    fn rollback_transaction(&mut self) -> Result<(), TxnMiddlewareError>;
}

/// A session shared between callers; the engine locks it per call.
pub type SharedSession<S> = Arc<Mutex<S>>;

thread_local! {
    static HELD_SESSIONS: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a shared session as locked by the current thread while a call runs
/// on it, so a nested call on the same thread can be refused instead of
/// waiting on a lock it already holds.
pub(crate) struct HeldSession {
    key: usize,
}

impl HeldSession {
    /// `None` if this thread already holds `session`.
    pub(crate) fn enter<S>(session: &SharedSession<S>) -> Option<Self> {
        let key = Arc::as_ptr(session).cast::<()>() as usize;
        HELD_SESSIONS.with_borrow_mut(|held| {
            if held.contains(&key) {
                None
            } else {
                held.push(key);
                Some(Self { key })
            }
        })
    }
}

impl Drop for HeldSession {
    fn drop(&mut self) {
        HELD_SESSIONS.with_borrow_mut(|held| {
            if let Some(pos) = held.iter().rposition(|k| *k == self.key) {
                held.swap_remove(pos);
            }
        });
    }
}

/// Yields the session a call should run against. Must always return one.
pub trait SessionProvider: Send + Sync {
    type Session: Session + Send;

    fn get_session(&self) -> SharedSession<Self::Session>;
}

/// Hands out the same session to every call, e.g. one session per request.
#[derive(Debug)]
pub struct FixedSessionProvider<S> {
    session: SharedSession<S>,
}

impl<S> FixedSessionProvider<S> {
    #[must_use]
    pub fn new(session: S) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
        }
    }

    #[must_use]
    pub fn from_shared(session: SharedSession<S>) -> Self {
        Self { session }
    }

    #[must_use]
    pub fn session(&self) -> SharedSession<S> {
        Arc::clone(&self.session)
    }
}

impl<S> Clone for FixedSessionProvider<S> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
        }
    }
}

impl<S: Session + Send> SessionProvider for FixedSessionProvider<S> {
    type Session = S;

    fn get_session(&self) -> SharedSession<S> {
        Arc::clone(&self.session)
    }
}

/// A [`Session`] over one `SQLite` connection.
///
/// Beginning while a transaction is already active opens a savepoint, so an
/// inner unit of work that does not join the outer transaction commits or
/// rolls back on its own.
#[derive(Debug)]
pub struct SqliteSession {
    conn: Connection,
    savepoints: usize,
}

fn savepoint_name(depth: usize) -> String {
    format!("txn_middleware_sp_{depth}")
}

impl SqliteSession {
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            savepoints: 0,
        }
    }

    /// Open a connection with `opts` and wrap it.
    ///
    /// # Errors
    /// Returns `TxnMiddlewareError` if the connection cannot be opened.
    pub fn open(opts: &SqliteOptions) -> Result<Self, TxnMiddlewareError> {
        opts.open().map(Self::new)
    }

    /// The underlying connection, for units of work that need the driver API.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    #[must_use]
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Number of savepoints currently open above the outer transaction.
    #[must_use]
    pub fn savepoint_depth(&self) -> usize {
        self.savepoints
    }

    /// Run a statement and return the number of changed rows.
    ///
    /// # Errors
    /// Returns `TxnMiddlewareError` if the statement fails.
    pub fn execute<D>(&self, sql: &str, data: &D) -> Result<i64, TxnMiddlewareError>
    where
        D: PreparedStatementDataProvider + ?Sized,
    {
        tracing::debug!("session executing: {sql}");
        let params = to_sqlite_values(&data.ordered_values());
        run_statement(&self.conn, sql, &params).map(|outcome| outcome.updated_rows)
    }

    /// # Errors
    /// Returns `TxnMiddlewareError` if any statement of the batch fails.
    pub fn execute_batch(&self, sql: &str) -> Result<(), TxnMiddlewareError> {
        tracing::debug!("session executing batch: {sql}");
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// # Errors
    /// Returns `TxnMiddlewareError` if the query fails.
    pub fn query_all<D>(&self, sql: &str, data: &D) -> Result<Vec<ResultRow>, TxnMiddlewareError>
    where
        D: PreparedStatementDataProvider + ?Sized,
    {
        tracing::debug!("session querying: {sql}");
        collect_rows(&self.conn, sql, &to_sqlite_values(&data.ordered_values()))
    }

    /// Call `on_row` for every row; the row is reused between calls.
    ///
    /// # Errors
    /// Returns `TxnMiddlewareError` if the query fails.
    pub fn query_all_with<D, F>(
        &self,
        sql: &str,
        data: &D,
        mut on_row: F,
    ) -> Result<usize, TxnMiddlewareError>
    where
        D: PreparedStatementDataProvider + ?Sized,
        F: FnMut(&ResultRow),
    {
        tracing::debug!("session querying: {sql}");
        let params = to_sqlite_values(&data.ordered_values());
        for_each_row(&self.conn, sql, &params, |row| {
            on_row(row);
            Ok(())
        })
    }

    /// First column of the first row as a count; NULL or no rows count as 0.
    ///
    /// # Errors
    /// Returns `TxnMiddlewareError` if the query fails or the value is not an
    /// integer.
    pub fn query_count<D>(&self, sql: &str, data: &D) -> Result<i64, TxnMiddlewareError>
    where
        D: PreparedStatementDataProvider + ?Sized,
    {
        tracing::debug!("session counting: {sql}");
        let params = to_sqlite_values(&data.ordered_values());
        Ok(first_count(&self.conn, sql, &params)?.unwrap_or(0))
    }

    fn rollback_with_busy_retries(&self) -> Result<(), TxnMiddlewareError> {
        for (idx, delay) in ROLLBACK_BUSY_RETRIES.iter().copied().enumerate() {
            match self.conn.execute_batch("ROLLBACK") {
                Ok(()) => return Ok(()),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::DatabaseBusy
                        && idx + 1 < ROLLBACK_BUSY_RETRIES.len() =>
                {
                    thread::sleep(delay);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(TxnMiddlewareError::TransactionError(
            "rollback retries exhausted".into(),
        ))
    }

    fn ensure_active(&mut self, action: &str) -> Result<(), TxnMiddlewareError> {
        if self.conn.is_autocommit() {
            self.savepoints = 0;
            return Err(TxnMiddlewareError::TransactionError(format!(
                "no active transaction to {action}"
            )));
        }
        Ok(())
    }
}

impl Session for SqliteSession {
    fn is_transaction_active(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn begin_transaction(&mut self) -> Result<(), TxnMiddlewareError> {
        if self.conn.is_autocommit() {
            self.savepoints = 0;
            self.conn.execute_batch("BEGIN")?;
        } else {
            let depth = self.savepoints + 1;
            self.conn
                .execute_batch(&format!("SAVEPOINT {}", savepoint_name(depth)))?;
            self.savepoints = depth;
        }
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), TxnMiddlewareError> {
        self.ensure_active("commit")?;
        if self.savepoints > 0 {
            self.conn
                .execute_batch(&format!("RELEASE {}", savepoint_name(self.savepoints)))?;
            self.savepoints -= 1;
        } else {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback_transaction(&mut self) -> Result<(), TxnMiddlewareError> {
        self.ensure_active("roll back")?;
        if self.savepoints > 0 {
            let name = savepoint_name(self.savepoints);
            self.conn
                .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))?;
            self.savepoints -= 1;
        } else {
            self.rollback_with_busy_retries()?;
        }
        Ok(())
    }
}
