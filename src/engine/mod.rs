//! The transactional execution engine.
//!
//! A unit of work is a closure over `&mut S` where `S` is a [`Session`]. The
//! engine decides whether the call owns a transaction or joins one that is
//! already active, begins/commits/rolls back only what it owns, times the
//! call, counts it, and turns any error into an
//! [`ExecutionOutcome::Failure`] after the exception handler has seen it.
//!
//! Nested units of work receive the session explicitly and go through
//! [`TransactionalEngine::execute_in_transaction`]. Calling
//! [`TransactionalEngine::do_in_transaction`] from inside a unit of work on
//! the same session fails with [`TxnMiddlewareError::ReentrantSession`]
//! instead of locking the session a second time.

mod config;
mod outcome;
mod session;

use std::error::Error;
use std::sync::{Arc, PoisonError, RwLock, TryLockError};
use std::time::{Duration, Instant};

use crate::conversion::convert_opt;
use crate::error::{ConversionError, TxnMiddlewareError};
use crate::handlers::{
    LoggingExceptionHandler, invoke_exception_handler, invoke_time_exceeded_handler,
};
use crate::telemetry::ExecutionTelemetry;
use crate::types::RowValues;

pub use config::{
    DEFAULT_EXECUTION_TIME_THRESHOLD, EngineOptions, EngineOptionsBuilder, ExecutionConfig,
};
pub use outcome::ExecutionOutcome;
use session::HeldSession;
pub use session::{FixedSessionProvider, Session, SessionProvider, SharedSession, SqliteSession};

/// Rolls back an owned transaction unless it was finished explicitly.
///
/// Covers the unwind path when a unit of work panics.
struct TransactionGuard<'a, S: Session> {
    session: &'a mut S,
    telemetry: &'a ExecutionTelemetry,
    armed: bool,
}

impl<'a, S: Session> TransactionGuard<'a, S> {
    fn new(session: &'a mut S, telemetry: &'a ExecutionTelemetry) -> Self {
        Self {
            session,
            telemetry,
            armed: true,
        }
    }

    fn commit(&mut self) -> Result<(), TxnMiddlewareError> {
        self.session.commit_transaction()?;
        self.armed = false;
        self.telemetry.transaction_committed();
        Ok(())
    }

    fn rollback(&mut self) {
        self.armed = false;
        if !self.session.is_transaction_active() {
            return;
        }
        match self.session.rollback_transaction() {
            Ok(()) => self.telemetry.transaction_rolled_back(),
            Err(err) => tracing::warn!("rollback failed: {err}"),
        }
    }
}

impl<S: Session> Drop for TransactionGuard<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("unit of work did not complete; rolling back");
            self.rollback();
        }
    }
}

/// Runs units of work against sessions from a [`SessionProvider`].
///
/// ```rust
/// use txn_middleware::prelude::*;
///
/// # fn main() -> Result<(), TxnMiddlewareError> {
/// let session = SqliteSession::open(&SqliteOptions::in_memory())?;
/// let engine = TransactionalEngine::new(FixedSessionProvider::new(session));
///
/// let outcome = engine.do_in_transaction(|s: &mut SqliteSession| {
///     s.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)")?;
///     s.execute("INSERT INTO t (id) VALUES (?)", &[RowValues::Int(1)])
/// });
/// assert_eq!(outcome.value(), Some(&1));
/// assert_eq!(engine.telemetry().transactions_committed(), 1);
/// # Ok(())
/// # }
/// ```
pub struct TransactionalEngine<P: SessionProvider> {
    provider: P,
    options: RwLock<EngineOptions>,
    config: Arc<ExecutionConfig>,
}

impl<P: SessionProvider> TransactionalEngine<P> {
    /// An engine with default options and its own [`ExecutionConfig`].
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, ExecutionConfig::shared())
    }

    /// An engine sharing `config` (telemetry and handlers) with others.
    #[must_use]
    pub fn with_config(provider: P, config: Arc<ExecutionConfig>) -> Self {
        Self {
            provider,
            options: RwLock::new(EngineOptions::default()),
            config,
        }
    }

    #[must_use]
    pub fn with_options(self, options: EngineOptions) -> Self {
        self.set_options(options);
        self
    }

    #[must_use]
    pub fn session_provider(&self) -> &P {
        &self.provider
    }

    #[must_use]
    pub fn config(&self) -> &Arc<ExecutionConfig> {
        &self.config
    }

    #[must_use]
    pub fn telemetry(&self) -> &ExecutionTelemetry {
        self.config.telemetry()
    }

    /// Calls slower than this are reported to the slow-execution handler.
    #[must_use]
    pub fn execution_time_threshold(&self) -> Duration {
        self.config.execution_time_threshold()
    }

    #[must_use]
    pub fn options(&self) -> EngineOptions {
        *self.options.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_options(&self, options: EngineOptions) {
        *self.options.write().unwrap_or_else(PoisonError::into_inner) = options;
    }

    pub fn set_synchronize_session(&self, enabled: bool) {
        self.update_options(|o| o.synchronize_session = enabled);
    }

    pub fn set_allow_nested_transactions(&self, enabled: bool) {
        self.update_options(|o| o.allow_nested_transactions = enabled);
    }

    pub fn set_use_transaction_for_select(&self, enabled: bool) {
        self.update_options(|o| o.use_transaction_for_select = enabled);
    }

    fn update_options(&self, f: impl FnOnce(&mut EngineOptions)) {
        f(&mut self.options.write().unwrap_or_else(PoisonError::into_inner));
    }

    /// Run `work` in a transaction on the provider's session and return its
    /// value.
    pub fn do_in_transaction<T, E, F>(&self, work: F) -> ExecutionOutcome<T, E>
    where
        F: FnOnce(&mut P::Session) -> Result<T, E>,
        E: Error + From<TxnMiddlewareError> + 'static,
    {
        self.run_on_provided_session("transaction", true, work)
    }

    /// Run `work` in a transaction; `true` if it succeeded.
    pub fn run_in_transaction<E, F>(&self, work: F) -> bool
    where
        F: FnOnce(&mut P::Session) -> Result<(), E>,
        E: Error + From<TxnMiddlewareError> + 'static,
    {
        self.do_in_transaction(work).is_success()
    }

    /// Run select work on the provider's session, in a transaction only when
    /// `use_transaction_for_select` is set.
    pub fn do_select<T, E, F>(&self, work: F) -> ExecutionOutcome<T, E>
    where
        F: FnOnce(&mut P::Session) -> Result<T, E>,
        E: Error + From<TxnMiddlewareError> + 'static,
    {
        let use_transaction = self.options().use_transaction_for_select;
        self.run_on_provided_session("select", use_transaction, work)
    }

    /// Run `work` on an explicit session, for units of work nested inside
    /// another one. With `allow_nested` and an active transaction the call
    /// joins it; otherwise it owns a transaction of its own.
    pub fn execute_in_transaction<S, T, E, F>(
        &self,
        session: &mut S,
        allow_nested: bool,
        work: F,
    ) -> ExecutionOutcome<T, E>
    where
        S: Session,
        F: FnOnce(&mut S) -> Result<T, E>,
        E: Error + From<TxnMiddlewareError> + 'static,
    {
        let started = Instant::now();
        let result = self.run_work(session, allow_nested, true, work);
        self.report("transaction", started, result)
    }

    /// Run select work on an explicit session without a transaction.
    pub fn execute_select<S, T, E, F>(&self, session: &mut S, work: F) -> ExecutionOutcome<T, E>
    where
        S: Session,
        F: FnOnce(&mut S) -> Result<T, E>,
        E: Error + From<TxnMiddlewareError> + 'static,
    {
        let started = Instant::now();
        let result = self.run_work(session, false, false, work);
        self.report("select", started, result)
    }

    /// Interpret the value of a `COUNT` query; NULL counts as zero.
    ///
    /// # Errors
    /// Returns `ConversionError` if the value is not an integer.
    pub fn select_count_result(value: &RowValues) -> Result<i64, ConversionError> {
        Ok(convert_opt::<i64>(value)?.unwrap_or(0))
    }

    fn run_on_provided_session<T, E, F>(
        &self,
        label: &str,
        use_transaction: bool,
        work: F,
    ) -> ExecutionOutcome<T, E>
    where
        F: FnOnce(&mut P::Session) -> Result<T, E>,
        E: Error + From<TxnMiddlewareError> + 'static,
    {
        let options = self.options();
        let allow_nested = options.allow_nested_transactions;
        let started = Instant::now();
        let shared = self.provider.get_session();
        let Some(_held) = HeldSession::enter(&shared) else {
            tracing::warn!("{label} called again on a session this thread holds");
            let err = E::from(TxnMiddlewareError::ReentrantSession);
            return self.report(label, started, Err(err));
        };

        let result = if options.synchronize_session {
            let mut session = shared.lock().unwrap_or_else(PoisonError::into_inner);
            self.run_work(&mut *session, allow_nested, use_transaction, work)
        } else {
            match shared.try_lock() {
                Ok(mut session) => {
                    self.run_work(&mut *session, allow_nested, use_transaction, work)
                }
                Err(TryLockError::Poisoned(poisoned)) => {
                    let mut session = poisoned.into_inner();
                    self.run_work(&mut *session, allow_nested, use_transaction, work)
                }
                Err(TryLockError::WouldBlock) => Err(E::from(TxnMiddlewareError::SessionBusy)),
            }
        };
        self.report(label, started, result)
    }

    fn run_work<S, T, E, F>(
        &self,
        session: &mut S,
        allow_nested: bool,
        use_transaction: bool,
        work: F,
    ) -> Result<T, E>
    where
        S: Session,
        F: FnOnce(&mut S) -> Result<T, E>,
        E: From<TxnMiddlewareError>,
    {
        if !use_transaction || (allow_nested && session.is_transaction_active()) {
            return work(session);
        }

        session.begin_transaction().map_err(E::from)?;
        let telemetry = self.config.telemetry();
        telemetry.transaction_started();
        let mut guard = TransactionGuard::new(session, telemetry);

        match work(&mut *guard.session) {
            Ok(value) => match guard.commit() {
                Ok(()) => Ok(value),
                Err(err) => {
                    guard.rollback();
                    Err(E::from(err))
                }
            },
            Err(err) => {
                guard.rollback();
                Err(err)
            }
        }
    }

    fn report<T, E>(
        &self,
        label: &str,
        started: Instant,
        result: Result<T, E>,
    ) -> ExecutionOutcome<T, E>
    where
        E: Error + 'static,
    {
        let elapsed = started.elapsed();
        let telemetry = self.config.telemetry();
        let handlers = self.config.handlers();

        let outcome = match result {
            Ok(value) => {
                telemetry.record_success(elapsed);
                ExecutionOutcome::Success(value)
            }
            Err(err) => {
                telemetry.record_failure(elapsed);
                match &handlers.exception {
                    Some(handler) => invoke_exception_handler(handler.as_ref(), &err),
                    None => invoke_exception_handler(&LoggingExceptionHandler, &err),
                }
                ExecutionOutcome::Failure(err)
            }
        };

        if elapsed > handlers.threshold {
            let message = format!(
                "{label} took {} ms, over the {} ms threshold",
                elapsed.as_millis(),
                handlers.threshold.as_millis()
            );
            invoke_time_exceeded_handler(handlers.time_exceeded.as_ref(), &message, elapsed);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SqliteOptions;

    type Engine = TransactionalEngine<FixedSessionProvider<SqliteSession>>;

    fn engine() -> Result<Engine, TxnMiddlewareError> {
        let session = SqliteSession::open(&SqliteOptions::in_memory())?;
        session.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")?;
        Ok(TransactionalEngine::new(FixedSessionProvider::new(session)))
    }

    #[test]
    fn select_count_treats_null_as_zero() {
        assert_eq!(Engine::select_count_result(&RowValues::Null), Ok(0));
        assert_eq!(Engine::select_count_result(&RowValues::Int(12)), Ok(12));
        assert!(Engine::select_count_result(&RowValues::Text("x".into())).is_err());
    }

    #[test]
    fn select_without_transaction_does_not_count_one() -> Result<(), TxnMiddlewareError> {
        let engine = engine()?;
        let outcome = engine.do_select(|s: &mut SqliteSession| {
            assert!(!s.is_transaction_active());
            s.query_count("SELECT count(*) FROM t", &[] as &[RowValues])
        });
        assert_eq!(outcome.into_value(), Some(0));
        let snap = engine.telemetry().snapshot();
        assert_eq!(snap.transactions_started, 0);
        assert_eq!(snap.executions_succeeded, 1);

        engine.set_use_transaction_for_select(true);
        let outcome = engine.do_select(|s: &mut SqliteSession| {
            Ok::<_, TxnMiddlewareError>(s.is_transaction_active())
        });
        assert_eq!(outcome.into_value(), Some(true));
        assert_eq!(engine.telemetry().transactions_started(), 1);
        Ok(())
    }

    #[test]
    fn panicking_work_is_rolled_back() -> Result<(), TxnMiddlewareError> {
        let engine = engine()?;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = engine.do_in_transaction(|s: &mut SqliteSession| {
                s.execute("INSERT INTO t (v) VALUES ('lost')", &[] as &[RowValues])?;
                if s.is_transaction_active() {
                    panic!("unit of work bug");
                }
                Ok::<_, TxnMiddlewareError>(())
            });
        }));
        assert!(result.is_err());
        assert_eq!(engine.telemetry().transactions_rolled_back(), 1);

        let count = engine.do_select(|s: &mut SqliteSession| {
            assert!(!s.is_transaction_active());
            s.query_count("SELECT count(*) FROM t", &[] as &[RowValues])
        });
        assert_eq!(count.into_value(), Some(0));
        Ok(())
    }
}
