//! Pluggable handlers for failed and slow executions.
//!
//! Handlers are user code. The engine and executor invoke them through
//! [`invoke_exception_handler`] and [`invoke_time_exceeded_handler`], which
//! catch a panicking handler and log it instead of letting it unwind into the
//! transaction bookkeeping.

use std::any::Any;
use std::backtrace::Backtrace;
use std::error::Error;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

/// Receives an error that escaped a unit of work or a statement.
pub trait ExceptionHandler: Send + Sync {
    fn handle(&self, error: &(dyn Error + 'static));
}

impl<F> ExceptionHandler for F
where
    F: Fn(&(dyn Error + 'static)) + Send + Sync,
{
    fn handle(&self, error: &(dyn Error + 'static)) {
        self(error);
    }
}

/// Logs the error with `tracing::error!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingExceptionHandler;

impl ExceptionHandler for LoggingExceptionHandler {
    fn handle(&self, error: &(dyn Error + 'static)) {
        tracing::error!("execution failed: {error}");
    }
}

/// Notified when an execution took longer than the configured threshold.
pub trait ExecutionTimeExceededHandler: Send + Sync {
    fn on_execution_time_exceeded(&self, message: &str, elapsed: Duration);
}

impl<F> ExecutionTimeExceededHandler for F
where
    F: Fn(&str, Duration) + Send + Sync,
{
    fn on_execution_time_exceeded(&self, message: &str, elapsed: Duration) {
        self(message, elapsed);
    }
}

/// Logs slow executions with `tracing::warn!`, optionally with a backtrace
/// of the reporting thread. The default handler includes the backtrace.
#[derive(Debug, Clone, Copy)]
pub struct LoggingExecutionTimeExceededHandler {
    emit_stack_trace: bool,
}

impl Default for LoggingExecutionTimeExceededHandler {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LoggingExecutionTimeExceededHandler {
    #[must_use]
    pub fn new(emit_stack_trace: bool) -> Self {
        Self { emit_stack_trace }
    }

    #[must_use]
    pub fn emits_stack_trace(&self) -> bool {
        self.emit_stack_trace
    }
}

impl ExecutionTimeExceededHandler for LoggingExecutionTimeExceededHandler {
    fn on_execution_time_exceeded(&self, message: &str, elapsed: Duration) {
        if self.emit_stack_trace {
            let trace = Backtrace::force_capture();
            tracing::warn!(elapsed_ms = elapsed.as_millis(), "{message}\n{trace}");
        } else {
            tracing::warn!(elapsed_ms = elapsed.as_millis(), "{message}");
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "<non-string panic payload>"
    }
}

/// Run an exception handler; a panic inside it is logged and swallowed.
pub(crate) fn invoke_exception_handler(
    handler: &dyn ExceptionHandler,
    error: &(dyn Error + 'static),
) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler.handle(error))) {
        tracing::error!(
            "exception handler panicked while handling \"{error}\": {}",
            panic_message(payload.as_ref())
        );
    }
}

/// Run a slow-execution handler; a panic inside it is logged and swallowed.
pub(crate) fn invoke_time_exceeded_handler(
    handler: &dyn ExecutionTimeExceededHandler,
    message: &str,
    elapsed: Duration,
) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| {
        handler.on_execution_time_exceeded(message, elapsed);
    })) {
        tracing::error!(
            "execution time exceeded handler panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}
