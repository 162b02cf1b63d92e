//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::callbacks::{
    GeneratedKeysCallback, NOT_INITIALIZED, SingleGeneratedKey, UpdatedRowCount,
    UpdatedRowCountCallback,
};
pub use crate::conversion::{FromRowValue, convert, convert_opt};
pub use crate::engine::{
    EngineOptions, ExecutionConfig, ExecutionOutcome, FixedSessionProvider, Session,
    SessionProvider, SharedSession, SqliteSession, TransactionalEngine,
};
pub use crate::error::{ConversionError, TxnMiddlewareError};
pub use crate::executor::DbExecutor;
pub use crate::handlers::{
    ExceptionHandler, ExecutionTimeExceededHandler, LoggingExceptionHandler,
    LoggingExecutionTimeExceededHandler,
};
pub use crate::params::{ConstantPreparedStatementDataProvider, PreparedStatementDataProvider};
pub use crate::placeholders::count_placeholders;
pub use crate::provider::{
    ConnectionProvider, DirectConnectionProvider, JournalMode, PooledConnectionProvider,
    ProvidedConnection, SqliteOptions, SqliteOptionsBuilder,
};
pub use crate::results::{ResultField, ResultRow};
pub use crate::telemetry::{ExecutionTelemetry, TelemetrySnapshot};
pub use crate::types::{RowValues, sql_types};
