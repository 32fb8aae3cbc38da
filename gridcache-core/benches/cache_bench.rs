//! Criterion benchmarks for cache hot paths.
//!
//! Benchmarks:
//! 1. Table merge (rolling-window accumulation)
//! 2. Segment concatenation
//! 3. Store upsert + lookup round trip through the JSON file

use chrono::{Duration, NaiveDate, NaiveDateTime};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gridcache_core::{CacheStore, Table};

// ── Helpers ──────────────────────────────────────────────────────────

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2018, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// `n` quarter-hour rows starting `offset` steps after 2018-01-01.
fn make_table(n: usize, offset: usize) -> Table {
    Table::from_rows(
        ["day_ahead", "load_factor"],
        (0..n).map(|i| {
            let step = (i + offset) as i64;
            let x = step as f64 * 0.01;
            (
                start() + Duration::minutes(15 * step),
                vec![1000.0 + x.sin() * 200.0, x.cos().abs()],
            )
        }),
    )
    .unwrap()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_merge");
    for &history in &[672usize, 35_040] {
        // One week of fresh data overlapping the tail of the history.
        let existing = make_table(history, 0);
        let fresh = make_table(672, history - 336);
        group.bench_with_input(BenchmarkId::from_parameter(history), &history, |b, _| {
            b.iter(|| Table::merge(black_box(&existing), black_box(&fresh)))
        });
    }
    group.finish();
}

fn bench_concat(c: &mut Criterion) {
    // Twelve monthly segments of quarter-hour data.
    let parts: Vec<Table> = (0..12).map(|m| make_table(2_880, m * 2_880)).collect();
    c.bench_function("concat_12_months", |b| {
        b.iter(|| Table::concat(black_box(parts.clone())))
    });
}

fn bench_store_round_trip(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path().join("bench.json"));
    let table = make_table(35_040, 0);

    c.bench_function("store_upsert_lookup_1y", |b| {
        b.iter(|| {
            store.upsert("http://bench/load_2018.csv", black_box(&table)).unwrap();
            store.lookup("http://bench/load_2018.csv").unwrap()
        })
    });
}

criterion_group!(benches, bench_merge, bench_concat, bench_store_round_trip);
criterion_main!(benches);
