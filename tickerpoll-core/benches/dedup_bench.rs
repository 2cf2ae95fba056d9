//! Criterion benchmarks for the per-cycle store path.
//!
//! Benchmarks:
//! 1. Dedup of a batch against a large seen-key set
//! 2. Key index load from a store file
//! 3. Polygon response parsing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashSet;

use chrono::{Duration, TimeZone, Utc};
use tickerpoll_core::data::{dedupe, BarStore, CsvBarStore, PolygonProvider};
use tickerpoll_core::domain::{Bar, DedupKey, Ticker};

fn make_bars(tickers: usize, days: usize) -> Vec<Bar> {
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 5, 0, 0).unwrap();
    (0..tickers)
        .flat_map(|t| {
            let ticker = Ticker::new(&format!("T{t:04}"));
            (0..days).map(move |d| {
                let close = 100.0 + (d as f64 * 0.1).sin() * 10.0;
                Bar {
                    ticker: ticker.clone(),
                    timestamp: base + Duration::days(d as i64),
                    open: close - 0.3,
                    high: close + 1.5,
                    low: close - 1.5,
                    close,
                    volume: 1_000_000.0,
                    vwap: Some(close),
                    transactions: Some(10_000),
                }
            })
        })
        .collect()
}

fn bench_dedupe(c: &mut Criterion) {
    let mut group = c.benchmark_group("dedupe");
    for &store_tickers in &[100usize, 1_000, 5_000] {
        let seen: HashSet<DedupKey> = make_bars(store_tickers, 250).iter().map(Bar::key).collect();
        // A typical batch: five tickers, half already stored.
        let batch: Vec<Bar> = make_bars(5, 500);
        group.bench_with_input(
            BenchmarkId::from_parameter(seen.len()),
            &seen,
            |b, seen| b.iter(|| dedupe(black_box(batch.clone()), seen)),
        );
    }
    group.finish();
}

fn bench_read_keys(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stock_data.csv");
    let mut store = CsvBarStore::new(&path);
    store.append(&make_bars(200, 250)).unwrap();

    c.bench_function("read_keys_50k_rows", |b| {
        b.iter(|| black_box(store.read_keys().unwrap()))
    });
}

fn bench_parse_response(c: &mut Criterion) {
    let results: Vec<String> = (0..250)
        .map(|i| {
            format!(
                r#"{{"v":1000000.0,"vw":100.5,"o":100.0,"c":101.0,"h":102.0,"l":99.0,"t":{},"n":5000}}"#,
                1_704_171_600_000i64 + i * 86_400_000
            )
        })
        .collect();
    let body = format!(
        r#"{{"ticker":"AAPL","status":"OK","resultsCount":250,"results":[{}]}}"#,
        results.join(",")
    );
    let ticker = Ticker::new("AAPL");

    c.bench_function("parse_response_250_bars", |b| {
        b.iter(|| PolygonProvider::parse_response(&ticker, black_box(&body)).unwrap())
    });
}

criterion_group!(benches, bench_dedupe, bench_read_keys, bench_parse_response);
criterion_main!(benches);
