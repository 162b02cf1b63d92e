//! Criterion comparison of reading a result set through the reused-row
//! callback vs. collecting cloned rows with `query_all`. Both variants run the
//! same query against the same seeded file so the difference is the per-row
//! allocation.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::LazyLock;
use tempfile::TempDir;
use txn_middleware::prelude::*;

struct Dataset {
    _dir: TempDir,
    options: SqliteOptions,
    rows: usize,
}

static DATASET: LazyLock<Dataset> = LazyLock::new(|| {
    let rows = row_count();
    let dir = tempfile::tempdir().expect("create benchmark directory");
    let path = dir.path().join("bench_rows.db");
    let options = SqliteOptions::builder(path.to_string_lossy())
        .journal_mode(JournalMode::Wal)
        .finish();

    let mut session = SqliteSession::open(&options).expect("open benchmark database");
    session
        .execute_batch(
            "CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL, active BOOLEAN);",
        )
        .expect("create table");
    session.begin_transaction().expect("begin");
    for id in 0..rows {
        let id = i64::try_from(id).expect("row id fits i64");
        session
            .execute(
                "INSERT INTO test (id, name, score, active) VALUES (?, ?, ?, ?)",
                &ConstantPreparedStatementDataProvider::empty()
                    .with(id)
                    .with(format!("name_{id}"))
                    .with(id as f64 * 0.5)
                    .with(id % 2 == 0),
            )
            .expect("seed row");
    }
    session.commit_transaction().expect("commit");

    Dataset {
        _dir: dir,
        options,
        rows,
    }
});

/// Rows to seed, from `BENCH_ROWS` or a default of 10k.
fn row_count() -> usize {
    std::env::var("BENCH_ROWS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(10_000)
}

fn bench_row_iteration(c: &mut Criterion) {
    let dataset = &*DATASET;
    let provider = PooledConnectionProvider::new(&dataset.options, 1).expect("build pool");
    let executor = DbExecutor::new(provider);
    let sql = "SELECT id, name, score, active FROM test";

    let mut group = c.benchmark_group("row_iteration");
    group.throughput(Throughput::Elements(dataset.rows as u64));

    group.bench_function(BenchmarkId::new("callback", dataset.rows), |b| {
        b.iter(|| {
            let mut total = 0_i64;
            let ok = executor.query_all_with(sql, |row| {
                total += row.get(0).ok().and_then(|f| f.as_i64().ok()).unwrap_or(0);
            });
            assert!(ok);
            black_box(total)
        });
    });

    group.bench_function(BenchmarkId::new("collect", dataset.rows), |b| {
        b.iter(|| {
            let rows = executor.query_all(sql).expect("query rows");
            let total: i64 = rows
                .iter()
                .map(|row| row.get(0).ok().and_then(|f| f.as_i64().ok()).unwrap_or(0))
                .sum();
            black_box(total)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_row_iteration);
criterion_main!(benches);
