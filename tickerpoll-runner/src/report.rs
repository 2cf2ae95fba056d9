//! Per-cycle outcome reporting.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use tickerpoll_core::data::FetchError;
use tickerpoll_core::domain::Ticker;

/// What one cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Offset the batch actually started at (0 after a wrap).
    pub cursor: usize,
    /// Offset the next cycle will start at.
    pub next_cursor: usize,
    /// The requested cursor was at or past the end and restarted from 0.
    pub wrapped: bool,
    pub attempted: Vec<Ticker>,
    /// Tickers that fetched successfully but had no bars in range.
    pub no_data: Vec<Ticker>,
    pub failures: Vec<FetchError>,
    /// Bars returned by the provider across the batch.
    pub fetched_rows: usize,
    /// Bars newly written to the store after dedup.
    pub appended_rows: usize,
}

impl CycleReport {
    pub fn failed_tickers(&self) -> Vec<&Ticker> {
        self.failures.iter().map(FetchError::ticker).collect()
    }

    pub fn succeeded(&self) -> usize {
        self.attempted.len() - self.failures.len()
    }

    /// Emit the cycle summary and one warning per failed ticker.
    pub fn log(&self) {
        for failure in &self.failures {
            warn!(ticker = %failure.ticker(), error = %failure, "ticker contributed no rows this cycle");
        }
        if !self.no_data.is_empty() {
            info!(
                tickers = ?self.no_data.iter().map(Ticker::as_str).collect::<Vec<_>>(),
                "no data in range"
            );
        }
        info!(
            cursor = self.cursor,
            next_cursor = self.next_cursor,
            attempted = self.attempted.len(),
            failed = self.failures.len(),
            fetched = self.fetched_rows,
            appended = self.appended_rows,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "cycle finished"
        );
    }
}
