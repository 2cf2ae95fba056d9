//! One time-series observation for a ticker.

use super::Ticker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single ticker at a single instant.
///
/// `vwap` and `transactions` are provider extras; they are carried into the
/// store when present but play no part in identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ticker: Ticker,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub vwap: Option<f64>,
    pub transactions: Option<u64>,
}

impl Bar {
    /// The (ticker, timestamp) pair that identifies this observation.
    pub fn key(&self) -> DedupKey {
        DedupKey {
            ticker: self.ticker.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Identity of a bar in the store: two bars with the same key are the same row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub ticker: Ticker,
    pub timestamp: DateTime<Utc>,
}

impl DedupKey {
    pub fn new(ticker: Ticker, timestamp: DateTime<Utc>) -> Self {
        Self { ticker, timestamp }
    }
}
