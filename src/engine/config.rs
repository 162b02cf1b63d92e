use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TxnMiddlewareError;
use crate::handlers::{
    ExceptionHandler, ExecutionTimeExceededHandler, LoggingExecutionTimeExceededHandler,
};
use crate::telemetry::ExecutionTelemetry;

/// Default slow-execution threshold.
pub const DEFAULT_EXECUTION_TIME_THRESHOLD: Duration = Duration::from_millis(1000);

/// Per-engine behavior switches, read once at the start of every call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Hold the session lock for the whole call instead of failing fast when
    /// the session is in use.
    pub synchronize_session: bool,
    /// Let a call join a transaction that is already active on its session.
    pub allow_nested_transactions: bool,
    /// Run select work inside a transaction too.
    pub use_transaction_for_select: bool,
}

impl EngineOptions {
    #[must_use]
    pub fn builder() -> EngineOptionsBuilder {
        EngineOptionsBuilder::default()
    }

    /// Parse options from JSON; missing fields keep their defaults.
    ///
    /// # Errors
    /// Returns `TxnMiddlewareError::ConfigError` if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, TxnMiddlewareError> {
        serde_json::from_str(json)
            .map_err(|e| TxnMiddlewareError::ConfigError(format!("invalid engine options: {e}")))
    }
}

/// Fluent builder for [`EngineOptions`].
#[derive(Debug, Clone, Default)]
pub struct EngineOptionsBuilder {
    opts: EngineOptions,
}

impl EngineOptionsBuilder {
    #[must_use]
    pub fn synchronize_session(mut self, enabled: bool) -> Self {
        self.opts.synchronize_session = enabled;
        self
    }

    #[must_use]
    pub fn allow_nested_transactions(mut self, enabled: bool) -> Self {
        self.opts.allow_nested_transactions = enabled;
        self
    }

    #[must_use]
    pub fn use_transaction_for_select(mut self, enabled: bool) -> Self {
        self.opts.use_transaction_for_select = enabled;
        self
    }

    #[must_use]
    pub fn finish(self) -> EngineOptions {
        self.opts
    }
}

struct HandlerRegistry {
    threshold: Duration,
    time_exceeded: Arc<dyn ExecutionTimeExceededHandler>,
    exception: Option<Arc<dyn ExceptionHandler>>,
}

/// Handlers copied out of the registry for one report.
pub(crate) struct HandlerSnapshot {
    pub(crate) threshold: Duration,
    pub(crate) time_exceeded: Arc<dyn ExecutionTimeExceededHandler>,
    pub(crate) exception: Option<Arc<dyn ExceptionHandler>>,
}

/// Telemetry and handlers shared by every engine constructed with it.
///
/// Handlers and the threshold can be replaced at any time; a call that is
/// already reporting keeps the handlers it read.
pub struct ExecutionConfig {
    telemetry: ExecutionTelemetry,
    handlers: RwLock<HandlerRegistry>,
}

impl ExecutionConfig {
    /// Fresh telemetry and the default threshold. Slow calls are logged with
    /// a backtrace and errors are logged until other handlers are set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            telemetry: ExecutionTelemetry::new(),
            handlers: RwLock::new(HandlerRegistry {
                threshold: DEFAULT_EXECUTION_TIME_THRESHOLD,
                time_exceeded: Arc::new(LoggingExecutionTimeExceededHandler::default()),
                exception: None,
            }),
        }
    }

    /// A fresh config ready to hand to several engines.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    #[must_use]
    pub fn telemetry(&self) -> &ExecutionTelemetry {
        &self.telemetry
    }

    #[must_use]
    pub fn execution_time_threshold(&self) -> Duration {
        self.read().threshold
    }

    pub fn set_execution_time_threshold(&self, threshold: Duration) {
        self.write().threshold = threshold;
    }

    pub fn set_execution_time_exceeded_handler(
        &self,
        handler: impl ExecutionTimeExceededHandler + 'static,
    ) {
        self.write().time_exceeded = Arc::new(handler);
    }

    /// Install a handler for errors escaping units of work. Without one,
    /// errors are logged.
    pub fn set_exception_handler(&self, handler: impl ExceptionHandler + 'static) {
        self.write().exception = Some(Arc::new(handler));
    }

    pub fn clear_exception_handler(&self) {
        self.write().exception = None;
    }

    #[must_use]
    pub fn has_custom_exception_handler(&self) -> bool {
        self.read().exception.is_some()
    }

    pub(crate) fn handlers(&self) -> HandlerSnapshot {
        let registry = self.read();
        HandlerSnapshot {
            threshold: registry.threshold,
            time_exceeded: Arc::clone(&registry.time_exceeded),
            exception: registry.exception.clone(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HandlerRegistry> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HandlerRegistry> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionConfig")
            .field("telemetry", &self.telemetry.snapshot())
            .field("execution_time_threshold", &self.execution_time_threshold())
            .field("custom_exception_handler", &self.has_custom_exception_handler())
            .finish()
    }
}
