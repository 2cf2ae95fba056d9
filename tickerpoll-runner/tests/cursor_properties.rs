//! Property tests for batch planning and cursor advancement.

mod common;

use std::collections::HashSet;
use std::num::NonZeroUsize;

use proptest::prelude::*;
use tickerpoll_core::data::MemoryCursor;
use tickerpoll_runner::{next_cursor, plan_batch, BatchJob};

fn nz(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

proptest! {
    /// From a fresh cursor every ticker is visited within ceil(N/B) cycles,
    /// and any later window of that many cycles covers the universe again.
    #[test]
    fn every_ticker_visited_each_revolution(n in 1usize..60, b in 1usize..20) {
        let batch_size = nz(b);
        let revolution = n.div_ceil(b);
        let mut cursor = 0;
        let mut slices = Vec::new();
        for _ in 0..revolution * 3 {
            let range = plan_batch(n, cursor, batch_size);
            cursor = next_cursor(range.start, batch_size, n);
            slices.push(range);
        }

        for window in slices.windows(revolution) {
            let visited: HashSet<usize> = window.iter().flat_map(|r| r.clone()).collect();
            prop_assert_eq!(visited.len(), n);
        }
    }

    #[test]
    fn cursor_stays_within_universe(n in 1usize..200, b in 1usize..50, start in 0usize..400) {
        let batch_size = nz(b);
        let range = plan_batch(n, start, batch_size);
        prop_assert!(range.start < n);
        prop_assert!(range.end <= n);
        prop_assert!(!range.is_empty());
        prop_assert!(range.len() <= b);
        prop_assert!(next_cursor(range.start, batch_size, n) < n);
    }

    /// A cycle always starts exactly at a persisted in-range cursor.
    #[test]
    fn resumes_at_in_range_cursor(n in 1usize..100, b in 1usize..20, frac in 0.0f64..1.0) {
        let cursor = ((n as f64) * frac) as usize;
        prop_assume!(cursor < n);
        prop_assert_eq!(plan_batch(n, cursor, nz(b)).start, cursor);
    }

    /// Driving the real job over a scripted universe matches the planner.
    #[test]
    fn job_attempts_match_plan(n in 1usize..12, b in 1usize..6, cycles in 1usize..8) {
        let names: Vec<String> = (0..n).map(|i| format!("T{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut job = BatchJob::new(
            common::universe(&refs),
            Box::new(common::MockProvider::new()),
            Box::new(tickerpoll_core::data::IndexedStore::new(
                tickerpoll_core::data::CsvBarStore::new("unused-never-written.csv"),
            )),
            Box::new(MemoryCursor::new(0)),
            common::settings(b, 1),
        )
        .unwrap();

        let mut expected = 0;
        for _ in 0..cycles {
            let report = job.run_once().unwrap();
            let range = plan_batch(n, expected, nz(b));
            prop_assert_eq!(report.cursor, range.start);
            prop_assert_eq!(common::symbols(&report.attempted), &refs[range.clone()]);
            expected = report.next_cursor;
        }
    }
}
