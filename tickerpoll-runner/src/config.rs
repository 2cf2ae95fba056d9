//! Poller configuration.
//!
//! Defaults reproduce a small-account polling setup: 5 tickers per cycle, one
//! cycle per minute, daily bars for calendar year 2024. Values may come from a
//! TOML file; the CLI layers flags and environment variables on top.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tickerpoll_core::data::PolygonSettings;

/// Upper bound on `provider.max_retries`.
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("provider API key is required (set api_key, --api-key, or POLYGON_API_KEY)")]
    MissingApiKey,

    #[error("start date {start} is after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be at most {max}, got {value}")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("sort must be `asc` or `desc`, got `{0}`")]
    InvalidSort(String),
}

/// Provider request knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    pub base_url: String,
    pub multiplier: u32,
    pub timespan: String,
    pub adjusted: bool,
    pub sort: String,
    pub limit: u32,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.polygon.io".into(),
            multiplier: 1,
            timespan: "day".into(),
            adjusted: true,
            sort: "asc".into(),
            limit: 5000,
            request_timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Complete poller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollerConfig {
    /// One ticker per line, no header, first field only.
    pub universe_path: PathBuf,
    /// Accumulating CSV store.
    pub output_path: PathBuf,
    /// Plain-text cursor file.
    pub cursor_path: PathBuf,
    pub api_key: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Tickers per cycle.
    pub batch_size: usize,
    /// Seconds between cycle starts.
    pub interval_secs: u64,
    /// Parallel fetches within a cycle (1 = sequential).
    pub fetch_concurrency: usize,
    /// Re-read the store for every cycle instead of keeping an in-memory key index.
    pub reload_store: bool,
    pub provider: ProviderConfig,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            universe_path: PathBuf::from("tickers.csv"),
            output_path: PathBuf::from("stock_data.csv"),
            cursor_path: PathBuf::from("last_index.txt"),
            api_key: None,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
            batch_size: 5,
            interval_secs: 60,
            fetch_concurrency: 1,
            reload_store: false,
            provider: ProviderConfig::default(),
        }
    }
}

impl PollerConfig {
    /// Load from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reject configurations that cannot form a batch or a request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Zero {
                field: "batch_size",
            });
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::Zero {
                field: "interval_secs",
            });
        }
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::Zero {
                field: "fetch_concurrency",
            });
        }
        if self.provider.limit == 0 {
            return Err(ConfigError::Zero {
                field: "provider.limit",
            });
        }
        if self.provider.multiplier == 0 {
            return Err(ConfigError::Zero {
                field: "provider.multiplier",
            });
        }
        if self.provider.max_retries > MAX_RETRIES {
            return Err(ConfigError::TooLarge {
                field: "provider.max_retries",
                value: u64::from(self.provider.max_retries),
                max: u64::from(MAX_RETRIES),
            });
        }
        if self.start_date > self.end_date {
            return Err(ConfigError::InvalidDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if !matches!(self.provider.sort.as_str(), "asc" | "desc") {
            return Err(ConfigError::InvalidSort(self.provider.sort.clone()));
        }
        self.api_key()?;
        Ok(())
    }

    /// Non-empty API key, or an error.
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn batch_size(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.batch_size).ok_or(ConfigError::Zero {
            field: "batch_size",
        })
    }

    /// Request settings for the Polygon provider.
    pub fn polygon_settings(&self) -> Result<PolygonSettings, ConfigError> {
        let mut settings = PolygonSettings::new(self.api_key()?);
        settings.base_url = self.provider.base_url.clone();
        settings.multiplier = self.provider.multiplier;
        settings.timespan = self.provider.timespan.clone();
        settings.adjusted = self.provider.adjusted;
        settings.sort = self.provider.sort.clone();
        settings.limit = self.provider.limit;
        settings.timeout = Duration::from_secs(self.provider.request_timeout_secs);
        settings.max_retries = self.provider.max_retries;
        Ok(settings)
    }
}
