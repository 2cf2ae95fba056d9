//! Bar provider trait and the per-ticker fetch error.
//!
//! `BarProvider` abstracts over remote time-series sources so the batch cycle
//! can run against Polygon in production and a scripted mock in tests.

use crate::domain::{Bar, Ticker};
use chrono::NaiveDate;
use thiserror::Error;

/// Failure to fetch one ticker's bars.
///
/// Every variant carries the ticker so a cycle report can attribute failures
/// by identifier. None of these are fatal to a batch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("{ticker}: network unreachable: {reason}")]
    Network { ticker: Ticker, reason: String },

    #[error("{ticker}: HTTP {status}")]
    Http { ticker: Ticker, status: u16 },

    #[error("{ticker}: rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited {
        ticker: Ticker,
        retry_after_secs: u64,
    },

    #[error("{ticker}: provider rejected credentials")]
    Unauthorized { ticker: Ticker },

    #[error("{ticker}: unexpected response: {reason}")]
    Response { ticker: Ticker, reason: String },

    #[error("{ticker}: skipped, provider circuit breaker is open")]
    CircuitOpen { ticker: Ticker },
}

impl FetchError {
    pub fn ticker(&self) -> &Ticker {
        match self {
            FetchError::Network { ticker, .. }
            | FetchError::Http { ticker, .. }
            | FetchError::RateLimited { ticker, .. }
            | FetchError::Unauthorized { ticker }
            | FetchError::Response { ticker, .. }
            | FetchError::CircuitOpen { ticker } => ticker,
        }
    }
}

/// Source of bars for a ticker over a date range.
///
/// Implementations return an empty Vec when the ticker simply has no data in
/// range; that is not an error.
pub trait BarProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch bars for `ticker` between `start` and `end` (inclusive).
    fn fetch(&self, ticker: &Ticker, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<Bar>, FetchError>;

    /// False while the provider refuses requests (circuit breaker open).
    fn is_available(&self) -> bool;
}
