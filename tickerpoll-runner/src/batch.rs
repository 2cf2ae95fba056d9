//! The batch cycle: slice the universe at the cursor, fetch each ticker,
//! dedupe against the store, append survivors, advance the cursor.
//!
//! `BatchJob::run_cycle` takes the cursor as an argument and returns the next
//! cursor in its report, so it can be exercised against any (universe, cursor,
//! store) without touching the cursor file. `BatchJob::run_once` adds the
//! read/persist of the cursor around it.

use std::num::NonZeroUsize;
use std::ops::Range;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use tickerpoll_core::data::{
    dedupe, BarProvider, BarStore, CursorError, CursorStore, FetchError, StoreError, Universe,
};
use tickerpoll_core::domain::{Bar, Ticker};

use crate::report::CycleReport;

/// Cycle-level failure. Per-ticker fetch failures never become one of these.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("store write failed, cursor not advanced: {0}")]
    Store(#[from] StoreError),

    #[error("cursor persist failed: {0}")]
    Cursor(#[from] CursorError),
}

/// Fixed per-job parameters.
#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub batch_size: NonZeroUsize,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Parallel fetches within a cycle; 1 fetches sequentially.
    pub fetch_concurrency: usize,
}

/// Range of the universe processed when starting at `cursor`.
///
/// A cursor at or past the end restarts from 0. The range is shorter than
/// `batch_size` only at the tail of the universe.
pub fn plan_batch(universe_len: usize, cursor: usize, batch_size: NonZeroUsize) -> Range<usize> {
    let start = if cursor >= universe_len { 0 } else { cursor };
    let end = start.saturating_add(batch_size.get()).min(universe_len);
    start..end
}

/// Cursor for the cycle after one that started at `start`.
///
/// Advances by the full batch size even when the slice was short, wrapping
/// to 0 once it reaches the universe length.
pub fn next_cursor(start: usize, batch_size: NonZeroUsize, universe_len: usize) -> usize {
    let next = start.saturating_add(batch_size.get());
    if next >= universe_len {
        0
    } else {
        next
    }
}

/// Owns everything one polling process needs to run cycles.
pub struct BatchJob {
    universe: Universe,
    provider: Box<dyn BarProvider>,
    store: Box<dyn BarStore>,
    cursor: Box<dyn CursorStore>,
    settings: BatchSettings,
    thread_pool: Option<rayon::ThreadPool>,
}

impl BatchJob {
    pub fn new(
        universe: Universe,
        provider: Box<dyn BarProvider>,
        store: Box<dyn BarStore>,
        cursor: Box<dyn CursorStore>,
        settings: BatchSettings,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let thread_pool = if settings.fetch_concurrency > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(settings.fetch_concurrency)
                    .thread_name(|i| format!("tickerpoll-fetch-{i}"))
                    .build()?,
            )
        } else {
            None
        };

        Ok(Self {
            universe,
            provider,
            store,
            cursor,
            settings,
            thread_pool,
        })
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Persisted cursor and the batch the next cycle would process.
    pub fn next_batch(&self) -> (usize, &[Ticker]) {
        let cursor = self.cursor.read();
        let range = plan_batch(self.universe.len(), cursor, self.settings.batch_size);
        (cursor, &self.universe.tickers()[range])
    }

    /// One cycle with cursor persistence: read, run, write.
    ///
    /// The cursor is written whenever the cycle itself completes, even if every
    /// fetch failed. A store failure returns early so the batch is retried.
    pub fn run_once(&mut self) -> Result<CycleReport, CycleError> {
        let cursor = self.cursor.read();
        let report = self.run_cycle(cursor)?;
        self.cursor.write(report.next_cursor)?;
        report.log();
        Ok(report)
    }

    /// One cycle starting at `cursor`. Does not read or write the cursor store.
    pub fn run_cycle(&mut self, cursor: usize) -> Result<CycleReport, CycleError> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let batch_size = self.settings.batch_size;
        let len = self.universe.len();

        let range = plan_batch(len, cursor, batch_size);
        let wrapped = range.start != cursor;
        let batch = &self.universe.tickers()[range.clone()];

        info!(
            cursor = range.start,
            wrapped,
            batch = ?batch.iter().map(Ticker::as_str).collect::<Vec<_>>(),
            "fetching batch"
        );

        let results = fetch_batch(
            self.provider.as_ref(),
            self.thread_pool.as_ref(),
            batch,
            self.settings.start,
            self.settings.end,
        );

        let mut candidates: Vec<Bar> = Vec::new();
        let mut no_data = Vec::new();
        let mut failures = Vec::new();
        for (ticker, result) in results {
            match result {
                Ok(bars) if bars.is_empty() => {
                    debug!(%ticker, "no data in range");
                    no_data.push(ticker);
                }
                Ok(bars) => {
                    debug!(%ticker, rows = bars.len(), "fetched");
                    candidates.extend(bars);
                }
                Err(e) => {
                    warn!(%ticker, error = %e, "fetch failed");
                    failures.push(e);
                }
            }
        }

        let fetched_rows = candidates.len();
        let appended_rows = if candidates.is_empty() {
            0
        } else {
            let survivors = {
                let seen = self.store.seen_keys()?;
                dedupe(candidates, &seen)
            };
            if survivors.is_empty() {
                0
            } else {
                self.store.append(&survivors)?
            }
        };

        Ok(CycleReport {
            started_at,
            elapsed: timer.elapsed(),
            cursor: range.start,
            next_cursor: next_cursor(range.start, batch_size, len),
            wrapped,
            attempted: batch.to_vec(),
            no_data,
            failures,
            fetched_rows,
            appended_rows,
        })
    }
}

/// Fetch every ticker independently, preserving batch order in the output.
///
/// When the provider reports itself unavailable (circuit open) the remaining
/// tickers are recorded as failed without issuing requests.
fn fetch_batch(
    provider: &dyn BarProvider,
    thread_pool: Option<&rayon::ThreadPool>,
    batch: &[Ticker],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<(Ticker, Result<Vec<Bar>, FetchError>)> {
    let fetch_one = |ticker: &Ticker| {
        let result = if provider.is_available() {
            provider.fetch(ticker, start, end)
        } else {
            Err(FetchError::CircuitOpen {
                ticker: ticker.clone(),
            })
        };
        (ticker.clone(), result)
    };

    match thread_pool {
        Some(tp) => tp.install(|| batch.par_iter().map(fetch_one).collect()),
        None => batch.iter().map(fetch_one).collect(),
    }
}
