//! Polygon.io aggregates provider.
//!
//! Fetches bars from the v2 aggregates endpoint, one request per ticker:
//! `/v2/aggs/ticker/{ticker}/range/{multiplier}/{timespan}/{start}/{end}`.
//! Handles retries with capped exponential backoff, the shared circuit
//! breaker, and the mapping from Polygon's compact bar records onto [`Bar`].

use super::circuit_breaker::CircuitBreaker;
use super::provider::{BarProvider, FetchError};
use crate::domain::{Bar, Ticker};
use chrono::{DateTime, NaiveDate};
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Aggregates endpoint response. Only the fields we consume are modeled.
#[derive(Debug, Deserialize)]
struct AggsResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    results: Option<Vec<AggRecord>>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// One compact bar record: `t` is epoch millis, the rest map one-to-one.
#[derive(Debug, Deserialize)]
struct AggRecord {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
    #[serde(default)]
    vw: Option<f64>,
    #[serde(default)]
    n: Option<u64>,
}

/// Request settings for [`PolygonProvider`].
#[derive(Debug, Clone)]
pub struct PolygonSettings {
    pub api_key: String,
    pub base_url: String,
    pub multiplier: u32,
    pub timespan: String,
    pub adjusted: bool,
    pub sort: String,
    pub limit: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl PolygonSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.polygon.io".into(),
            multiplier: 1,
            timespan: "day".into(),
            adjusted: true,
            sort: "asc".into(),
            limit: 5000,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Sleep before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Failure to set up a [`PolygonProvider`].
#[derive(Debug, Error)]
pub enum PolygonInitError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid provider base URL `{url}`: {reason}")]
    BaseUrl { url: String, reason: String },
}

/// Polygon.io bar provider.
pub struct PolygonProvider {
    client: reqwest::blocking::Client,
    base_url: Url,
    settings: PolygonSettings,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl PolygonProvider {
    pub fn new(
        settings: PolygonSettings,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, PolygonInitError> {
        let base_url = Url::parse(&settings.base_url).map_err(|e| PolygonInitError::BaseUrl {
            url: settings.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(PolygonInitError::BaseUrl {
                url: settings.base_url.clone(),
                reason: "URL cannot carry a path".into(),
            });
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            settings,
            circuit_breaker,
        })
    }

    /// Endpoint URL (without query string) for a ticker and date range.
    ///
    /// Each path segment is percent-encoded, so a ticker such as `BRK/B`
    /// stays a single segment.
    pub fn aggs_url(&self, ticker: &Ticker, start: NaiveDate, end: NaiveDate) -> Url {
        let multiplier = self.settings.multiplier.to_string();
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();

        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "v2",
                "aggs",
                "ticker",
                ticker.as_str(),
                "range",
                multiplier.as_str(),
                self.settings.timespan.as_str(),
                start.as_str(),
                end.as_str(),
            ]);
        }
        url
    }

    fn query_params(&self) -> [(&'static str, String); 4] {
        [
            ("adjusted", self.settings.adjusted.to_string()),
            ("sort", self.settings.sort.clone()),
            ("limit", self.settings.limit.to_string()),
            ("apiKey", self.settings.api_key.clone()),
        ]
    }

    /// Parse an aggregates response body into bars.
    ///
    /// A missing or empty `results` array is a successful empty fetch.
    pub fn parse_response(ticker: &Ticker, body: &str) -> Result<Vec<Bar>, FetchError> {
        let resp: AggsResponse = serde_json::from_str(body).map_err(|e| FetchError::Response {
            ticker: ticker.clone(),
            reason: format!("invalid JSON: {e}"),
        })?;

        if resp.status.as_deref() == Some("ERROR") {
            let reason = resp
                .error
                .or(resp.message)
                .unwrap_or_else(|| "provider returned status ERROR".into());
            return Err(FetchError::Response {
                ticker: ticker.clone(),
                reason,
            });
        }

        resp.results
            .unwrap_or_default()
            .into_iter()
            .map(|rec| {
                let timestamp =
                    DateTime::from_timestamp_millis(rec.t).ok_or_else(|| FetchError::Response {
                        ticker: ticker.clone(),
                        reason: format!("timestamp out of range: {}", rec.t),
                    })?;
                Ok(Bar {
                    ticker: ticker.clone(),
                    timestamp,
                    open: rec.o,
                    high: rec.h,
                    low: rec.l,
                    close: rec.c,
                    volume: rec.v,
                    vwap: rec.vw,
                    transactions: rec.n,
                })
            })
            .collect()
    }

    /// One fetch with retries.
    ///
    /// Transport errors, 429 and 5xx are retried with backoff; when retries
    /// run out the last cause is returned. The breaker only hears about quota
    /// and ban responses: 403 trips it, and a fetch that stays rate limited
    /// through every retry counts as one failure.
    fn fetch_with_retry(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, FetchError> {
        let url = self.aggs_url(ticker, start, end);
        let params = self.query_params();
        let mut last_error: Option<FetchError> = None;

        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.settings.base_delay, attempt);
                debug!(%ticker, attempt, ?delay, "retrying after backoff");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(last_error.unwrap_or_else(|| FetchError::CircuitOpen {
                    ticker: ticker.clone(),
                }));
            }

            debug!(%ticker, %url, attempt, "requesting aggregates");
            let resp = match self.client.get(url.clone()).query(&params).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(%ticker, attempt, error = %e, "transport error");
                    last_error = Some(FetchError::Network {
                        ticker: ticker.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
                Err(e) => {
                    return Err(FetchError::Network {
                        ticker: ticker.clone(),
                        reason: e.to_string(),
                    })
                }
            };

            let status = resp.status();

            if status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                return Err(FetchError::Http {
                    ticker: ticker.clone(),
                    status: status.as_u16(),
                });
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(FetchError::Unauthorized {
                    ticker: ticker.clone(),
                });
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after_secs = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .unwrap_or(60);
                warn!(%ticker, attempt, retry_after_secs, "rate limited");
                last_error = Some(FetchError::RateLimited {
                    ticker: ticker.clone(),
                    retry_after_secs,
                });
                continue;
            }

            if status.is_server_error() {
                warn!(%ticker, attempt, %status, "server error");
                last_error = Some(FetchError::Http {
                    ticker: ticker.clone(),
                    status: status.as_u16(),
                });
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::Http {
                    ticker: ticker.clone(),
                    status: status.as_u16(),
                });
            }

            let body = resp.text().map_err(|e| FetchError::Network {
                ticker: ticker.clone(),
                reason: format!("failed to read body: {e}"),
            })?;
            let bars = Self::parse_response(ticker, &body)?;
            self.circuit_breaker.record_success();
            return Ok(bars);
        }

        let err = last_error.unwrap_or_else(|| FetchError::Network {
            ticker: ticker.clone(),
            reason: "max retries exceeded".into(),
        });
        if matches!(err, FetchError::RateLimited { .. }) {
            self.circuit_breaker.record_failure();
        }
        Err(err)
    }
}

impl BarProvider for PolygonProvider {
    fn name(&self) -> &str {
        "polygon"
    }

    fn fetch(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, FetchError> {
        self.fetch_with_retry(ticker, start, end)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
