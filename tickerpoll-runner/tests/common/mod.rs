//! Shared fixtures for runner integration tests.

#![allow(dead_code)]

use std::borrow::Cow;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, TimeZone, Utc};
use tickerpoll_core::data::{BarProvider, BarStore, FetchError, StoreError, Universe};
use tickerpoll_core::domain::{Bar, DedupKey, Ticker};
use tickerpoll_runner::BatchSettings;

/// Scripted response for one ticker.
#[derive(Debug, Clone)]
pub enum Scripted {
    Bars(Vec<Bar>),
    HttpStatus(u16),
}

/// Provider that replays scripted responses and records every call.
///
/// Tickers with no script return an empty (successful) fetch.
#[derive(Debug, Default)]
pub struct MockProvider {
    responses: HashMap<Ticker, Scripted>,
    calls: Mutex<Vec<Ticker>>,
    unavailable: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<Bar>) -> Self {
        self.responses.insert(Ticker::new(ticker), Scripted::Bars(bars));
        self
    }

    pub fn with_status(mut self, ticker: &str, status: u16) -> Self {
        self.responses
            .insert(Ticker::new(ticker), Scripted::HttpStatus(status));
        self
    }

    pub fn unavailable(self) -> Self {
        self.unavailable.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<Ticker> {
        self.calls.lock().unwrap().clone()
    }
}

impl BarProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn fetch(
        &self,
        ticker: &Ticker,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<Bar>, FetchError> {
        self.calls.lock().unwrap().push(ticker.clone());
        match self.responses.get(ticker) {
            Some(Scripted::Bars(bars)) => Ok(bars.clone()),
            Some(Scripted::HttpStatus(status)) => Err(FetchError::Http {
                ticker: ticker.clone(),
                status: *status,
            }),
            None => Ok(Vec::new()),
        }
    }

    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }
}

/// Shared handle so a test can keep the mock for call assertions after
/// boxing it into a job.
#[derive(Debug, Clone)]
pub struct SharedProvider(pub Arc<MockProvider>);

impl BarProvider for SharedProvider {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn fetch(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, FetchError> {
        self.0.fetch(ticker, start, end)
    }

    fn is_available(&self) -> bool {
        self.0.is_available()
    }
}

/// Store whose writes always fail.
#[derive(Debug, Default)]
pub struct FailingStore {
    keys: HashSet<DedupKey>,
}

impl BarStore for FailingStore {
    fn seen_keys(&mut self) -> Result<Cow<'_, HashSet<DedupKey>>, StoreError> {
        Ok(Cow::Borrowed(&self.keys))
    }

    fn append(&mut self, _bars: &[Bar]) -> Result<usize, StoreError> {
        Err(StoreError::Io {
            path: "unwritable.csv".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

pub fn bar(ticker: &str, day: u32) -> Bar {
    let close = 100.0 + day as f64;
    Bar {
        ticker: Ticker::new(ticker),
        timestamp: Utc.with_ymd_and_hms(2024, 1, day, 5, 0, 0).unwrap(),
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 10_000.0,
        vwap: Some(close - 0.5),
        transactions: Some(120),
    }
}

pub fn universe(symbols: &[&str]) -> Universe {
    Universe::from_tickers(symbols.iter().map(|s| Ticker::new(s)).collect())
}

pub fn settings(batch_size: usize, fetch_concurrency: usize) -> BatchSettings {
    BatchSettings {
        batch_size: NonZeroUsize::new(batch_size).unwrap(),
        start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        fetch_concurrency,
    }
}

pub fn symbols(tickers: &[Ticker]) -> Vec<&str> {
    tickers.iter().map(Ticker::as_str).collect()
}

/// Local HTTP server answering each request with `handler(path) -> (status, body)`.
/// Returns the base URL. The server thread lives until the test process exits.
pub fn serve_http(handler: impl Fn(&str) -> (u16, String) + Send + 'static) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            let request = String::from_utf8_lossy(&buf);
            let target = request.split_whitespace().nth(1).unwrap_or("/");
            let path = target.split('?').next().unwrap_or("/");
            let (status, body) = handler(path);
            let response = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    base_url
}

/// Aggregates body with one bar for `day` in January 2024, 05:00 UTC.
pub fn aggs_body(day: u32) -> String {
    let millis = Utc.with_ymd_and_hms(2024, 1, day, 5, 0, 0).unwrap().timestamp_millis();
    format!(
        r#"{{"status":"OK","resultsCount":1,"results":[{{"v":1000.0,"vw":10.5,"o":10.0,"c":11.0,"h":12.0,"l":9.0,"t":{millis},"n":42}}]}}"#
    )
}

