//! Ticker universe: the fixed, ordered list of identifiers to poll.
//!
//! The source is a bare comma-separated file with no header; only the first
//! field of each record is used. Tickers are normalized but never
//! deduplicated, so source order and multiplicity are preserved.

use crate::domain::Ticker;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("universe source {path} cannot be opened: {source}")]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("universe source is malformed: {0}")]
    Malformed(#[from] csv::Error),

    #[error("universe source {path} contains no tickers")]
    Empty { path: PathBuf },
}

/// Ordered, immutable ticker universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    tickers: Vec<Ticker>,
}

impl Universe {
    /// Load a universe from a file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path).map_err(|source| LoadError::Missing {
            path: path.to_path_buf(),
            source,
        })?;
        let universe = Self::from_reader(file)?;
        if universe.is_empty() {
            return Err(LoadError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(universe)
    }

    /// Parse a universe from any reader. An empty result is not an error here;
    /// callers decide whether an empty universe is fatal.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut tickers = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let Some(first) = record.get(0) else {
                continue;
            };
            let ticker = Ticker::new(first);
            if !ticker.is_empty() {
                tickers.push(ticker);
            }
        }

        Ok(Self { tickers })
    }

    pub fn from_tickers(tickers: Vec<Ticker>) -> Self {
        Self { tickers }
    }

    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    pub fn get(&self, index: usize) -> Option<&Ticker> {
        self.tickers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ticker> {
        self.tickers.iter()
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}
