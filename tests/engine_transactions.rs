use std::error::Error;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use txn_middleware::prelude::*;

type Engine = TransactionalEngine<FixedSessionProvider<SqliteSession>>;

fn no_params() -> &'static [RowValues] {
    &[]
}

fn accounts_session() -> Result<SqliteSession, TxnMiddlewareError> {
    let session = SqliteSession::open(&SqliteOptions::in_memory())?;
    session.execute_batch(
        "CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner TEXT NOT NULL, balance INTEGER NOT NULL);",
    )?;
    Ok(session)
}

fn engine() -> Result<Engine, TxnMiddlewareError> {
    Ok(TransactionalEngine::new(FixedSessionProvider::new(
        accounts_session()?,
    )))
}

fn count_accounts(engine: &Engine) -> Option<i64> {
    engine
        .do_select(|s: &mut SqliteSession| s.query_count("SELECT COUNT(*) FROM accounts", no_params()))
        .into_value()
}

#[derive(Debug, thiserror::Error)]
enum LedgerError {
    #[error("insufficient funds: balance {0}")]
    InsufficientFunds(i64),
    #[error(transparent)]
    Db(#[from] TxnMiddlewareError),
}

#[test]
fn insert_then_count_through_the_engine() -> Result<(), Box<dyn Error>> {
    let engine = engine()?;
    let inserted = engine.do_in_transaction(|s: &mut SqliteSession| {
        s.execute(
            "INSERT INTO accounts (owner, balance) VALUES (?, ?)",
            &ConstantPreparedStatementDataProvider::empty()
                .with("ada")
                .with(100_i64),
        )
    });
    assert_eq!(inserted.into_value(), Some(1));
    assert_eq!(count_accounts(&engine), Some(1));

    let snap = engine.telemetry().snapshot();
    assert_eq!(snap.transactions_started, 1);
    assert_eq!(snap.transactions_committed, 1);
    assert_eq!(snap.executions_succeeded, 2);
    assert_eq!(snap.success_latency.count, 2);
    Ok(())
}

#[test]
fn joined_inner_work_shares_the_outer_transaction() -> Result<(), Box<dyn Error>> {
    let engine = engine()?;
    engine.set_allow_nested_transactions(true);

    let outcome = engine.do_in_transaction(|s: &mut SqliteSession| {
        s.execute("INSERT INTO accounts (owner, balance) VALUES ('outer', 1)", no_params())?;
        engine
            .execute_in_transaction(s, true, |inner: &mut SqliteSession| {
                assert_eq!(inner.savepoint_depth(), 0);
                inner.execute("INSERT INTO accounts (owner, balance) VALUES ('inner', 2)", no_params())
            })
            .into_result()
    });
    assert!(outcome.is_success());

    let telemetry = engine.telemetry();
    assert_eq!(telemetry.transactions_started(), 1);
    assert_eq!(telemetry.transactions_committed(), 1);
    assert_eq!(telemetry.executions_succeeded(), 2);
    assert_eq!(count_accounts(&engine), Some(2));
    Ok(())
}

#[test]
fn unjoined_inner_work_owns_a_savepoint() -> Result<(), Box<dyn Error>> {
    let engine = engine()?;

    let outcome = engine.do_in_transaction(|s: &mut SqliteSession| {
        engine
            .execute_in_transaction(s, false, |inner: &mut SqliteSession| {
                assert_eq!(inner.savepoint_depth(), 1);
                inner.execute("INSERT INTO accounts (owner, balance) VALUES ('inner', 2)", no_params())
            })
            .into_result()
    });
    assert_eq!(outcome.into_value(), Some(1));

    let telemetry = engine.telemetry();
    assert_eq!(telemetry.transactions_started(), 2);
    assert_eq!(telemetry.transactions_committed(), 2);
    assert_eq!(telemetry.transactions_rolled_back(), 0);
    Ok(())
}

#[test]
fn failed_inner_savepoint_leaves_outer_work_intact() -> Result<(), Box<dyn Error>> {
    let engine = engine()?;

    let outcome = engine.do_in_transaction(|s: &mut SqliteSession| {
        s.execute("INSERT INTO accounts (owner, balance) VALUES ('kept', 5)", no_params())?;
        let inner = engine.execute_in_transaction(s, false, |inner: &mut SqliteSession| {
            inner.execute("INSERT INTO accounts (owner, balance) VALUES ('dropped', 6)", no_params())?;
            Err::<(), _>(LedgerError::InsufficientFunds(6))
        });
        assert!(inner.is_failure());
        Ok::<_, LedgerError>(())
    });
    assert!(outcome.is_success());

    let owners = engine
        .do_select(|s: &mut SqliteSession| s.query_all("SELECT owner FROM accounts", no_params()))
        .into_value()
        .ok_or("select failed")?;
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].get(0)?.as_string()?, Some("kept".to_string()));

    let snap = engine.telemetry().snapshot();
    assert_eq!(snap.transactions_started, 2);
    assert_eq!(snap.transactions_committed, 1);
    assert_eq!(snap.transactions_rolled_back, 1);
    assert_eq!(snap.executions_failed, 1);
    Ok(())
}

#[test]
fn failures_are_rolled_back_handled_once_and_returned() -> Result<(), Box<dyn Error>> {
    let engine = engine()?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine
        .config()
        .set_exception_handler(move |err: &(dyn Error + 'static)| {
            sink.lock().unwrap().push(err.to_string());
        });

    let outcome = engine.do_in_transaction(|s: &mut SqliteSession| {
        s.execute("INSERT INTO accounts (owner, balance) VALUES ('bob', 3)", no_params())?;
        let balance = s.query_count("SELECT balance FROM accounts WHERE owner = 'bob'", no_params())?;
        if balance < 10 {
            return Err(LedgerError::InsufficientFunds(balance));
        }
        Ok(balance)
    });

    assert!(outcome.is_failure());
    assert!(matches!(
        outcome.error(),
        Some(LedgerError::InsufficientFunds(3))
    ));
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        ["insufficient funds: balance 3".to_string()]
    );
    assert_eq!(count_accounts(&engine), Some(0));

    let snap = engine.telemetry().snapshot();
    assert_eq!(snap.transactions_rolled_back, 1);
    assert_eq!(snap.executions_failed, 1);
    assert_eq!(snap.failure_latency.count, 1);
    assert!(!engine.run_in_transaction(|s: &mut SqliteSession| {
        s.execute_batch("INSERT INTO nowhere VALUES (1)")
    }));
    assert_eq!(seen.lock().unwrap().len(), 2);
    Ok(())
}

#[test]
fn slow_calls_reach_the_time_exceeded_handler() -> Result<(), Box<dyn Error>> {
    let engine = engine()?;
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    engine.config().set_execution_time_threshold(Duration::ZERO);
    engine
        .config()
        .set_execution_time_exceeded_handler(move |message: &str, _elapsed: Duration| {
            sink.lock().unwrap().push(message.to_string());
        });

    let outcome = engine.do_in_transaction(|_: &mut SqliteSession| {
        thread::sleep(Duration::from_millis(2));
        Ok::<_, TxnMiddlewareError>(())
    });
    assert!(outcome.is_success());

    let messages = messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("transaction took"));
    assert!(messages[0].ends_with("over the 0 ms threshold"));
    Ok(())
}

#[test]
fn panicking_handlers_do_not_change_the_outcome() -> Result<(), Box<dyn Error>> {
    fn exploding_exception(_: &(dyn Error + 'static)) {
        panic!("exception handler bug");
    }
    fn exploding_timer(_: &str, _: Duration) {
        panic!("timer handler bug");
    }

    let engine = engine()?;
    engine.config().set_exception_handler(exploding_exception);
    engine.config().set_execution_time_exceeded_handler(exploding_timer);
    engine.config().set_execution_time_threshold(Duration::ZERO);

    let failed = engine.do_in_transaction(|s: &mut SqliteSession| s.execute_batch("NOT SQL"));
    assert!(failed.is_failure());

    let ok = engine.do_in_transaction(|s: &mut SqliteSession| {
        thread::sleep(Duration::from_millis(1));
        s.execute("INSERT INTO accounts (owner, balance) VALUES ('eve', 1)", no_params())
    });
    assert_eq!(ok.into_value(), Some(1));
    assert_eq!(engine.telemetry().executions_failed(), 1);
    Ok(())
}

#[test]
fn busy_session_fails_fast_without_synchronization() -> Result<(), Box<dyn Error>> {
    let engine = engine()?;
    let shared = engine.session_provider().session();
    let held = shared.lock().unwrap();

    let outcome =
        engine.do_in_transaction(|_: &mut SqliteSession| Ok::<_, TxnMiddlewareError>(()));
    assert!(matches!(
        outcome.error(),
        Some(TxnMiddlewareError::SessionBusy)
    ));
    assert_eq!(engine.telemetry().transactions_started(), 0);
    assert_eq!(engine.telemetry().executions_failed(), 1);
    assert!(!held.is_transaction_active());
    Ok(())
}

#[test]
fn synchronized_session_waits_for_the_holder() -> Result<(), Box<dyn Error>> {
    let engine = engine()?.with_options(
        EngineOptions::builder()
            .synchronize_session(true)
            .finish(),
    );
    let shared = engine.session_provider().session();
    let (locked_tx, locked_rx) = mpsc::channel();

    let holder = thread::spawn(move || {
        let session = shared.lock().unwrap();
        locked_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(50));
        session
            .execute("INSERT INTO accounts (owner, balance) VALUES ('first', 1)", no_params())
            .unwrap();
    });
    locked_rx.recv()?;

    let outcome = engine.do_in_transaction(|s: &mut SqliteSession| {
        s.query_count("SELECT COUNT(*) FROM accounts", no_params())
    });
    holder.join().map_err(|_| "holder panicked")?;
    assert_eq!(outcome.into_value(), Some(1));
    Ok(())
}

#[test]
fn engines_sharing_a_config_share_telemetry_and_handlers() -> Result<(), Box<dyn Error>> {
    let config = ExecutionConfig::shared();
    let first = TransactionalEngine::with_config(
        FixedSessionProvider::new(accounts_session()?),
        Arc::clone(&config),
    );
    let second = TransactionalEngine::with_config(
        FixedSessionProvider::new(accounts_session()?),
        Arc::clone(&config),
    );

    let handled = Arc::new(Mutex::new(0_usize));
    let counter = Arc::clone(&handled);
    config.set_exception_handler(move |_: &(dyn Error + 'static)| {
        *counter.lock().unwrap() += 1;
    });

    assert!(first.run_in_transaction(|s: &mut SqliteSession| {
        s.execute_batch("INSERT INTO accounts (owner, balance) VALUES ('a', 1)")
    }));
    assert!(!second.run_in_transaction(|s: &mut SqliteSession| {
        s.execute_batch("INSERT INTO accounts (owner) VALUES ('missing balance')")
    }));

    assert_eq!(*handled.lock().unwrap(), 1);
    let snap = config.telemetry().snapshot();
    assert_eq!(snap.executions_succeeded, 1);
    assert_eq!(snap.executions_failed, 1);
    assert_eq!(snap.transactions_committed, 1);
    assert_eq!(snap.transactions_rolled_back, 1);
    assert_eq!(first.telemetry().snapshot(), second.telemetry().snapshot());
    Ok(())
}

#[test]
fn options_load_from_json() -> Result<(), Box<dyn Error>> {
    let engine = engine()?.with_options(EngineOptions::from_json(
        r#"{"use_transaction_for_select": true}"#,
    )?);
    assert!(engine.options().use_transaction_for_select);
    assert!(!engine.options().synchronize_session);

    let active = engine
        .do_select(|s: &mut SqliteSession| Ok::<_, TxnMiddlewareError>(s.is_transaction_active()));
    assert_eq!(active.into_value(), Some(true));
    assert!(matches!(
        EngineOptions::from_json("{not json"),
        Err(TxnMiddlewareError::ConfigError(_))
    ));
    Ok(())
}

#[test]
fn nested_call_on_a_held_session_is_refused_instead_of_waiting() -> Result<(), Box<dyn Error>> {
    for synchronize in [true, false] {
        let (done_tx, done_rx) = mpsc::channel();
        thread::spawn(move || {
            let engine = engine().unwrap().with_options(
                EngineOptions::builder()
                    .synchronize_session(synchronize)
                    .allow_nested_transactions(true)
                    .finish(),
            );
            let outer = engine.do_in_transaction(|s: &mut SqliteSession| {
                s.execute("INSERT INTO accounts (owner, balance) VALUES ('outer', 1)", no_params())?;
                let inner = engine
                    .do_in_transaction(|_: &mut SqliteSession| Ok::<_, TxnMiddlewareError>(1));
                Ok::<_, TxnMiddlewareError>(matches!(
                    inner.error(),
                    Some(TxnMiddlewareError::ReentrantSession)
                ))
            });
            done_tx
                .send((
                    outer.into_value(),
                    count_accounts(&engine),
                    engine.telemetry().executions_failed(),
                ))
                .unwrap();
        });

        let (refused, count, failed) = done_rx.recv_timeout(Duration::from_secs(5))?;
        assert_eq!(refused, Some(true), "synchronize_session = {synchronize}");
        assert_eq!(count, Some(1));
        assert_eq!(failed, 1);
    }
    Ok(())
}
