//! Synchronous data-access layer over `rusqlite`.
//!
//! Two entry points:
//!
//! * [`DbExecutor`](executor::DbExecutor) runs single statements and queries
//!   against connections from a [`ConnectionProvider`](provider::ConnectionProvider),
//!   each inside its own transaction, and reports failures as data.
//! * [`TransactionalEngine`](engine::TransactionalEngine) runs units of work
//!   against a shared [`Session`](engine::Session), owning or joining the
//!   session's transaction, with telemetry and pluggable handlers for failed
//!   and slow executions.
//!
//! Query results use [`ResultRow`](results::ResultRow) and
//! [`ResultField`](results::ResultField), whose typed accessors convert
//! [`RowValues`](types::RowValues) through one central facility.

pub mod callbacks;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod params;
pub mod placeholders;
pub mod prelude;
pub mod provider;
pub mod results;
pub mod telemetry;
pub mod types;

pub use error::{ConversionError, TxnMiddlewareError};
pub use types::RowValues;
