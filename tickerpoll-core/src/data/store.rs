//! Append-only bar store.
//!
//! The canonical store is a CSV file with header
//! `timestamp,open,high,low,close,volume,ticker,vwap,transactions`. Rows are
//! only ever appended; nothing here rewrites or compacts prior rows.
//!
//! Reading locates the `timestamp` and `ticker` columns by header name, so a
//! store produced by another tool with a different column order still dedupes.

use crate::domain::{Bar, DedupKey, Ticker};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Header written when the store is created.
pub const STORE_HEADER: [&str; 9] = [
    "timestamp",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "ticker",
    "vwap",
    "transactions",
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("store {path} is not readable as CSV: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("store {path} has no `{column}` column")]
    MissingColumn { path: PathBuf, column: &'static str },
}

/// Accumulating store of bars.
pub trait BarStore: Send {
    /// Dedup keys of every bar already persisted.
    fn seen_keys(&mut self) -> Result<Cow<'_, HashSet<DedupKey>>, StoreError>;

    /// Durably append `bars`, returning how many rows were written.
    ///
    /// An empty slice must not touch the destination at all.
    fn append(&mut self, bars: &[Bar]) -> Result<usize, StoreError>;
}

/// Render a timestamp the way the store writes it (UTC, fractional seconds
/// only when non-zero).
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a store timestamp. Accepts the native format, RFC 3339, ISO with a
/// `T` separator, and bare dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
        return Some(ndt.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(ndt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// CSV-file store that re-reads the whole file for every `seen_keys` call.
#[derive(Debug, Clone)]
pub struct CsvBarStore {
    path: PathBuf,
}

impl CsvBarStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_err(&self, source: csv::Error) -> StoreError {
        StoreError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    /// Number of data rows in the store (0 if it does not exist).
    pub fn row_count(&self) -> Result<usize, StoreError> {
        if !self.path.exists() {
            return Ok(0);
        }
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| self.csv_err(e))?;
        let mut count = 0;
        for record in rdr.records() {
            record.map_err(|e| self.csv_err(e))?;
            count += 1;
        }
        Ok(count)
    }

    /// Read every (ticker, timestamp) pair from the file in one pass.
    pub fn read_keys(&self) -> Result<HashSet<DedupKey>, StoreError> {
        let mut keys = HashSet::new();
        if !self.path.exists() {
            return Ok(keys);
        }

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| self.csv_err(e))?;

        let headers = rdr.headers().map_err(|e| self.csv_err(e))?.clone();
        if headers.is_empty() {
            return Ok(keys);
        }
        let column = |name: &'static str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| StoreError::MissingColumn {
                    path: self.path.clone(),
                    column: name,
                })
        };
        let ts_idx = column("timestamp")?;
        let ticker_idx = column("ticker")?;

        let mut skipped = 0usize;
        for record in rdr.records() {
            let record = record.map_err(|e| self.csv_err(e))?;
            let parsed = record.get(ts_idx).and_then(parse_timestamp).zip(
                record
                    .get(ticker_idx)
                    .map(Ticker::new)
                    .filter(|t| !t.is_empty()),
            );
            match parsed {
                Some((timestamp, ticker)) => {
                    keys.insert(DedupKey::new(ticker, timestamp));
                }
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(
                path = %self.path.display(),
                skipped,
                "store rows with unparsable ticker or timestamp were ignored for dedup"
            );
        }

        Ok(keys)
    }

    /// Header of a non-empty existing file, or `None` when a header must be
    /// written first.
    fn existing_header(&self) -> Result<Option<csv::StringRecord>, StoreError> {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() == 0 => return Ok(None),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        }
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| self.csv_err(e))?;
        let header = rdr.headers().map_err(|e| self.csv_err(e))?.clone();
        Ok(Some(header).filter(|h| !h.is_empty()))
    }
}

/// Value of column `name` for `bar`. Columns the store does not know about
/// are left empty. `vw` and `n` are the provider's own names for vwap and
/// transactions.
fn render_field(bar: &Bar, name: &str) -> String {
    match name {
        "timestamp" => format_timestamp(&bar.timestamp),
        "open" => bar.open.to_string(),
        "high" => bar.high.to_string(),
        "low" => bar.low.to_string(),
        "close" => bar.close.to_string(),
        "volume" => bar.volume.to_string(),
        "ticker" => bar.ticker.to_string(),
        "vwap" | "vw" => bar.vwap.map(|v| v.to_string()).unwrap_or_default(),
        "transactions" | "n" => bar.transactions.map(|n| n.to_string()).unwrap_or_default(),
        _ => String::new(),
    }
}

impl BarStore for CsvBarStore {
    fn seen_keys(&mut self) -> Result<Cow<'_, HashSet<DedupKey>>, StoreError> {
        self.read_keys().map(Cow::Owned)
    }

    fn append(&mut self, bars: &[Bar]) -> Result<usize, StoreError> {
        if bars.is_empty() {
            return Ok(0);
        }

        let layout = self.existing_header()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(io::BufWriter::new(file));

        let columns: Vec<String> = match layout {
            Some(header) => header.iter().map(|h| h.trim().to_owned()).collect(),
            None => {
                wtr.write_record(STORE_HEADER).map_err(|e| self.csv_err(e))?;
                STORE_HEADER.iter().map(|h| (*h).to_owned()).collect()
            }
        };

        for bar in bars {
            wtr.write_record(columns.iter().map(|name| render_field(bar, name)))
                .map_err(|e| self.csv_err(e))?;
        }

        let mut buffered = wtr.into_inner().map_err(|e| self.io_err(e.into_error()))?;
        buffered.flush().map_err(|e| self.io_err(e))?;
        let file = buffered
            .into_inner()
            .map_err(|e| self.io_err(e.into_error()))?;
        file.sync_data().map_err(|e| self.io_err(e))?;

        Ok(bars.len())
    }
}

/// Store wrapper that keeps the seen-key set in memory.
///
/// The index is built from the inner store on first use and extended after
/// each successful append, so later cycles never re-read the file.
#[derive(Debug)]
pub struct IndexedStore<S> {
    inner: S,
    index: Option<HashSet<DedupKey>>,
}

impl<S: BarStore> IndexedStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, index: None }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Whether the index has been built yet.
    pub fn is_loaded(&self) -> bool {
        self.index.is_some()
    }
}

impl<S: BarStore> BarStore for IndexedStore<S> {
    fn seen_keys(&mut self) -> Result<Cow<'_, HashSet<DedupKey>>, StoreError> {
        if self.index.is_none() {
            let keys = self.inner.seen_keys()?.into_owned();
            self.index = Some(keys);
        }
        Ok(Cow::Borrowed(self.index.get_or_insert_with(HashSet::new)))
    }

    fn append(&mut self, bars: &[Bar]) -> Result<usize, StoreError> {
        let written = self.inner.append(bars)?;
        if let Some(index) = self.index.as_mut() {
            index.extend(bars.iter().map(Bar::key));
        }
        Ok(written)
    }
}
