mod args;
mod logging;
mod render;

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use tracing::Level;
use txn_middleware::prelude::*;

use crate::args::{Args, Command, ProviderKind, ShellConfig, parse_params};
use crate::render::row_to_json;

fn main() -> ExitCode {
    let config = ShellConfig::from_args(Args::parse());
    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    if let Err(err) = logging::init(config.log.as_deref(), level) {
        eprintln!("failed to open log file: {err}");
        return ExitCode::FAILURE;
    }

    let config_json = serde_json::to_string_pretty(&config).unwrap_or_else(|_| "{}".to_string());
    tracing::info!("config: {}", config_json);

    if let Command::Script { path } = &config.command {
        return run_script(&config.sqlite, path);
    }

    match config.provider {
        ProviderKind::Direct => run(
            &DbExecutor::new(DirectConnectionProvider::new(config.sqlite.clone())),
            &config.command,
        ),
        ProviderKind::Pooled => match PooledConnectionProvider::new(&config.sqlite, config.pool_size)
        {
            Ok(provider) => run(&DbExecutor::new(provider), &config.command),
            Err(err) => {
                tracing::error!("failed to build connection pool: {err}");
                ExitCode::FAILURE
            }
        },
    }
}

fn status(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn params_match(sql: &str, params: &[String]) -> bool {
    let expected = count_placeholders(sql);
    if expected != params.len() {
        tracing::error!(
            "statement expects {expected} parameters but {} were given",
            params.len()
        );
        return false;
    }
    true
}

fn run<P: ConnectionProvider>(executor: &DbExecutor<P>, command: &Command) -> ExitCode {
    match command {
        Command::Exec { sql, params } => {
            if !params_match(sql, params) {
                return ExitCode::FAILURE;
            }
            let mut key = None;
            let mut on_keys = |keys: Vec<Vec<RowValues>>| {
                key = keys.into_iter().next().and_then(|row| row.into_iter().next());
            };
            let mut updated = UpdatedRowCount::new();
            let ok = executor.execute_prepared_statement_with(
                sql,
                &parse_params(params),
                Some(&mut updated),
                Some(&mut on_keys),
            );
            if ok {
                println!("{} row(s) changed", updated.get());
                if let Some(RowValues::Int(id)) = key {
                    println!("generated key: {id}");
                }
            }
            status(ok)
        }
        Command::Query { sql, params } => {
            if !params_match(sql, params) {
                return ExitCode::FAILURE;
            }
            let mut rows = 0_usize;
            let ok = executor.query_all_prepared_with(sql, &parse_params(params), |row| {
                rows += 1;
                println!("{}", row_to_json(row));
            });
            tracing::info!("{rows} row(s)");
            status(ok)
        }
        Command::Count { sql, params } => {
            if !params_match(sql, params) {
                return ExitCode::FAILURE;
            }
            let count = executor.query_count_prepared(sql, &parse_params(params));
            if count == NOT_INITIALIZED {
                return ExitCode::FAILURE;
            }
            println!("{count}");
            ExitCode::SUCCESS
        }
        Command::Script { .. } => ExitCode::FAILURE,
    }
}

fn run_script(sqlite: &SqliteOptions, path: &std::path::Path) -> ExitCode {
    let sql = match fs::read_to_string(path) {
        Ok(sql) => sql,
        Err(err) => {
            tracing::error!("failed to read {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    };
    let session = match SqliteSession::open(sqlite) {
        Ok(session) => session,
        Err(err) => {
            tracing::error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let engine = TransactionalEngine::new(FixedSessionProvider::new(session));
    let ok = engine.run_in_transaction(|s: &mut SqliteSession| s.execute_batch(&sql));

    let snapshot = engine.telemetry().snapshot();
    match serde_json::to_string_pretty(&snapshot) {
        Ok(json) => println!("{json}"),
        Err(err) => tracing::warn!("failed to render telemetry: {err}"),
    }
    status(ok)
}
