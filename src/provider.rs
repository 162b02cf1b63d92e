//! Connection providers: where the executor gets its connections and whether
//! it closes them afterwards.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::thread;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use deadpool::unmanaged::{Object, Pool, PoolError};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::error::TxnMiddlewareError;

const CHECKOUT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// `SQLite` journal mode applied when a connection is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    Wal,
    Off,
}

impl JournalMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Persist => "PERSIST",
            JournalMode::Memory => "MEMORY",
            JournalMode::Wal => "WAL",
            JournalMode::Off => "OFF",
        }
    }
}

/// Options for opening `SQLite` connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteOptions {
    pub db_path: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "default_create")]
    pub create_if_missing: bool,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub journal_mode: Option<JournalMode>,
}

fn default_create() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            read_only: false,
            create_if_missing: default_create(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: None,
        }
    }

    /// Options for a private in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    #[must_use]
    pub fn builder(db_path: impl Into<String>) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path)
    }

    fn open_flags(&self) -> OpenFlags {
        let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.read_only {
            flags |= OpenFlags::SQLITE_OPEN_READ_ONLY;
        } else {
            flags |= OpenFlags::SQLITE_OPEN_READ_WRITE;
            if self.create_if_missing {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
        }
        flags
    }

    /// Open a connection with these options.
    ///
    /// # Errors
    /// Returns `TxnMiddlewareError::ConnectionError` if the database cannot be
    /// opened or configured.
    pub fn open(&self) -> Result<Connection, TxnMiddlewareError> {
        let conn = Connection::open_with_flags(&self.db_path, self.open_flags()).map_err(|e| {
            TxnMiddlewareError::ConnectionError(format!(
                "Failed to open SQLite database {}: {e}",
                self.db_path
            ))
        })?;
        conn.busy_timeout(Duration::from_millis(self.busy_timeout_ms))?;
        if let Some(mode) = self.journal_mode {
            conn.execute_batch(&format!("PRAGMA journal_mode = {};", mode.as_str()))?;
        }
        Ok(conn)
    }
}

/// Fluent builder for [`SqliteOptions`].
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.opts.read_only = read_only;
        self
    }

    #[must_use]
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.opts.create_if_missing = create;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.opts.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.opts.journal_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }
}

/// A connection handed out by a [`ConnectionProvider`].
///
/// Dereferences to the underlying [`rusqlite::Connection`].
pub enum ProvidedConnection {
    /// A connection owned outright by the caller.
    Dedicated(Connection),
    /// A connection checked out of a pool; dropping it returns it.
    Pooled(Object<Connection>),
}

impl fmt::Debug for ProvidedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvidedConnection::Dedicated(conn) => f.debug_tuple("Dedicated").field(conn).finish(),
            ProvidedConnection::Pooled(obj) => f.debug_tuple("Pooled").field(&**obj).finish(),
        }
    }
}

impl Deref for ProvidedConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            ProvidedConnection::Dedicated(conn) => conn,
            ProvidedConnection::Pooled(obj) => obj,
        }
    }
}

impl DerefMut for ProvidedConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        match self {
            ProvidedConnection::Dedicated(conn) => conn,
            ProvidedConnection::Pooled(obj) => obj,
        }
    }
}

impl ProvidedConnection {
    /// Close the connection. A pooled connection is taken out of its pool
    /// first. Failures are logged.
    pub fn close(self) {
        let conn = match self {
            ProvidedConnection::Dedicated(conn) => conn,
            ProvidedConnection::Pooled(obj) => Object::take(obj),
        };
        if let Err((_conn, err)) = conn.close() {
            tracing::warn!("failed to close SQLite connection: {err}");
        }
    }

    /// Hand the connection back without closing it.
    ///
    /// A pooled connection that is still inside a transaction is evicted
    /// instead of being returned, so the next borrower starts clean.
    pub fn release(self) {
        match self {
            ProvidedConnection::Pooled(obj) if !obj.is_autocommit() => {
                tracing::warn!("evicting pooled SQLite connection left inside a transaction");
                drop(Object::take(obj));
            }
            other => drop(other),
        }
    }
}

/// Source of connections for the [`DbExecutor`](crate::executor::DbExecutor).
pub trait ConnectionProvider: Send + Sync {
    /// A connection, or `None` if none can be obtained (the reason is logged).
    fn get_connection(&self) -> Option<ProvidedConnection>;

    /// Whether the executor must close connections from this provider after
    /// use instead of releasing them.
    fn should_close_connection(&self) -> bool;
}

impl<P: ConnectionProvider + ?Sized> ConnectionProvider for std::sync::Arc<P> {
    fn get_connection(&self) -> Option<ProvidedConnection> {
        (**self).get_connection()
    }

    fn should_close_connection(&self) -> bool {
        (**self).should_close_connection()
    }
}

/// Opens a fresh connection per call and lets the executor close it.
#[derive(Debug, Clone)]
pub struct DirectConnectionProvider {
    opts: SqliteOptions,
}

impl DirectConnectionProvider {
    #[must_use]
    pub fn new(opts: SqliteOptions) -> Self {
        Self { opts }
    }

    #[must_use]
    pub fn options(&self) -> &SqliteOptions {
        &self.opts
    }
}

impl ConnectionProvider for DirectConnectionProvider {
    fn get_connection(&self) -> Option<ProvidedConnection> {
        match self.opts.open() {
            Ok(conn) => Some(ProvidedConnection::Dedicated(conn)),
            Err(err) => {
                tracing::error!("could not get a connection: {err}");
                None
            }
        }
    }

    fn should_close_connection(&self) -> bool {
        true
    }
}

/// Hands out connections from a fixed-size pool; the executor releases them
/// back to the pool.
#[derive(Clone)]
pub struct PooledConnectionProvider {
    pool: Pool<Connection>,
    checkout_timeout: Duration,
}

impl PooledConnectionProvider {
    /// Open `size` connections with `opts` and pool them.
    ///
    /// # Errors
    /// Returns `TxnMiddlewareError::ConfigError` for a zero size, or the error
    /// of the first connection that fails to open.
    pub fn new(opts: &SqliteOptions, size: usize) -> Result<Self, TxnMiddlewareError> {
        if size == 0 {
            return Err(TxnMiddlewareError::ConfigError(
                "pool size must be at least 1".into(),
            ));
        }
        let conns = (0..size)
            .map(|_| opts.open())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_connections(conns))
    }

    /// Pool already opened connections.
    #[must_use]
    pub fn from_connections(conns: Vec<Connection>) -> Self {
        Self {
            pool: Pool::from(conns),
            checkout_timeout: Duration::from_secs(30),
        }
    }

    /// How long [`get_connection`](ConnectionProvider::get_connection) waits
    /// for a free connection.
    #[must_use]
    pub fn with_checkout_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = timeout;
        self
    }

    /// Connections currently idle in the pool.
    #[must_use]
    pub fn available(&self) -> usize {
        self.pool.status().available
    }

    /// Connections the pool currently owns, idle or checked out.
    #[must_use]
    pub fn size(&self) -> usize {
        self.pool.status().size
    }

    fn checkout(&self) -> Result<Object<Connection>, TxnMiddlewareError> {
        let deadline = Instant::now() + self.checkout_timeout;
        loop {
            match self.pool.try_get() {
                Ok(obj) => return Ok(obj),
                Err(PoolError::Closed) => return Err(PoolError::Closed.into()),
                Err(_) if Instant::now() < deadline => thread::sleep(CHECKOUT_POLL_INTERVAL),
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl fmt::Debug for PooledConnectionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnectionProvider")
            .field("size", &self.size())
            .field("available", &self.available())
            .field("checkout_timeout", &self.checkout_timeout)
            .finish()
    }
}

impl ConnectionProvider for PooledConnectionProvider {
    fn get_connection(&self) -> Option<ProvidedConnection> {
        match self.checkout() {
            Ok(obj) => Some(ProvidedConnection::Pooled(obj)),
            Err(err) => {
                tracing::error!("could not get a pooled connection: {err}");
                None
            }
        }
    }

    fn should_close_connection(&self) -> bool {
        false
    }
}
