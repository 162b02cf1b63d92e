use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use txn_middleware::prelude::*;

#[derive(Debug, Clone, Copy, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ProviderKind {
    /// Open and close a connection per statement.
    Direct,
    /// Reuse connections from a fixed-size pool.
    Pooled,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Run SQL through txn-middleware")]
pub(crate) struct Args {
    /// Database file, or `:memory:`.
    #[arg(long, default_value = ":memory:")]
    pub(crate) db: String,
    #[arg(long, value_enum, default_value = "direct")]
    pub(crate) provider: ProviderKind,
    #[arg(long, default_value_t = 4)]
    pub(crate) pool_size: usize,
    #[arg(long, value_enum)]
    pub(crate) journal_mode: Option<JournalMode>,
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) busy_timeout: Option<Duration>,
    #[arg(long)]
    pub(crate) read_only: bool,
    #[arg(long)]
    pub(crate) log: Option<PathBuf>,
    #[arg(long)]
    pub(crate) verbose: bool,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Command {
    /// Run one statement and print the number of changed rows.
    Exec {
        sql: String,
        /// Positional parameter; repeat for each placeholder.
        #[arg(long = "param")]
        params: Vec<String>,
    },
    /// Run a query and print each row as a JSON object.
    Query {
        sql: String,
        #[arg(long = "param")]
        params: Vec<String>,
    },
    /// Run a COUNT query and print the number.
    Count {
        sql: String,
        #[arg(long = "param")]
        params: Vec<String>,
    },
    /// Run a batch of statements as one transaction and print telemetry.
    Script {
        /// File holding the statements.
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ShellConfig {
    pub(crate) sqlite: SqliteOptions,
    pub(crate) provider: ProviderKind,
    pub(crate) pool_size: usize,
    pub(crate) log: Option<PathBuf>,
    pub(crate) verbose: bool,
    pub(crate) command: Command,
}

impl ShellConfig {
    pub(crate) fn from_args(args: Args) -> Self {
        let mut builder = SqliteOptions::builder(args.db).read_only(args.read_only);
        if let Some(timeout) = args.busy_timeout {
            builder = builder.busy_timeout(timeout);
        }
        if let Some(mode) = args.journal_mode {
            builder = builder.journal_mode(mode);
        }

        ShellConfig {
            sqlite: builder.finish(),
            provider: args.provider,
            pool_size: args.pool_size.max(1),
            log: args.log,
            verbose: args.verbose,
            command: args.command,
        }
    }
}

/// Interpret a command-line parameter: `null`, an integer, a float, or text.
pub(crate) fn parse_param(raw: &str) -> RowValues {
    if raw.eq_ignore_ascii_case("null") {
        RowValues::Null
    } else if let Ok(int) = raw.parse::<i64>() {
        RowValues::Int(int)
    } else if let Ok(float) = raw.parse::<f64>() {
        RowValues::Float(float)
    } else {
        RowValues::Text(raw.to_string())
    }
}

pub(crate) fn parse_params(raw: &[String]) -> ConstantPreparedStatementDataProvider {
    raw.iter().map(|p| parse_param(p)).collect()
}
