use thiserror::Error;

/// Failure converting a [`RowValues`](crate::types::RowValues) into a Rust type.
///
/// `NullValue` is kept apart from the other variants so callers can tell
/// "the column was NULL" from "the column held something unusable".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("cannot convert NULL to {target}")]
    NullValue { target: &'static str },

    #[error("cannot convert {from} value to {target}")]
    Incompatible {
        from: &'static str,
        target: &'static str,
    },

    #[error("{from} value {value} is out of range for {target}")]
    OutOfRange {
        from: &'static str,
        target: &'static str,
        value: String,
    },

    #[error("cannot parse {value:?} as {target}")]
    Unparsable { target: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum TxnMiddlewareError {
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("column index {index} out of range (row has {count} columns)")]
    ColumnIndexOutOfRange { index: usize, count: usize },

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Pool error: {0}")]
    PoolError(String),

    #[error("Session is in use by another call")]
    SessionBusy,

    #[error(
        "Session is already locked by this thread; pass it to execute_in_transaction for nested work"
    )]
    ReentrantSession,

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl From<deadpool::unmanaged::PoolError> for TxnMiddlewareError {
    fn from(err: deadpool::unmanaged::PoolError) -> Self {
        TxnMiddlewareError::PoolError(format!("SQLite pool error: {err}"))
    }
}
