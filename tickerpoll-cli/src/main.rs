//! tickerpoll CLI: poll daily bars for a ticker universe into a CSV store.
//!
//! Commands:
//! - `run`: fetch one batch per interval, forever (or `--cycles` times)
//! - `once`: fetch the next batch, persist, exit
//! - `status`: report universe size, persisted cursor, next batch, store size

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tickerpoll_core::data::{
    BarStore, CircuitBreaker, CsvBarStore, CursorStore, FileCursor, IndexedStore, PolygonProvider,
    Universe,
};
use tickerpoll_runner::{plan_batch, BatchJob, BatchSettings, PollerConfig, Scheduler};

#[derive(Parser)]
#[command(
    name = "tickerpoll",
    version,
    about = "Poll daily OHLCV bars for a ticker universe into an append-only CSV"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    overrides: Overrides,

    /// Log filter (e.g. `debug`, `tickerpoll_core=trace`). Defaults to RUST_LOG, then `info`.
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll forever: one batch per interval.
    Run {
        /// Stop after this many cycles (at least 1).
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        cycles: Option<u64>,
    },
    /// Run a single cycle and exit.
    Once,
    /// Show universe, cursor and store state without fetching.
    Status,
}

/// Settings layered over the config file. Flags win over environment
/// variables, which win over the file.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// TOML config file. Missing keys take built-in defaults.
    #[arg(long, global = true, env = "TICKERPOLL_CONFIG")]
    config: Option<PathBuf>,

    /// Ticker universe CSV (one symbol per line, no header).
    #[arg(long, global = true, env = "TICKERPOLL_UNIVERSE")]
    universe: Option<PathBuf>,

    /// Output CSV store.
    #[arg(long, global = true, env = "TICKERPOLL_OUTPUT")]
    output: Option<PathBuf>,

    /// Cursor file.
    #[arg(long, global = true, env = "TICKERPOLL_CURSOR_FILE")]
    cursor_file: Option<PathBuf>,

    /// Polygon API key.
    #[arg(long, global = true, env = "POLYGON_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// First day of the requested range (YYYY-MM-DD).
    #[arg(long, global = true, env = "TICKERPOLL_START")]
    start: Option<NaiveDate>,

    /// Last day of the requested range (YYYY-MM-DD).
    #[arg(long, global = true, env = "TICKERPOLL_END")]
    end: Option<NaiveDate>,

    /// Tickers per cycle.
    #[arg(long, global = true, env = "TICKERPOLL_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Seconds between cycle starts.
    #[arg(long, global = true, env = "TICKERPOLL_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// Parallel fetches within a cycle.
    #[arg(long, global = true, env = "TICKERPOLL_FETCH_CONCURRENCY")]
    fetch_concurrency: Option<usize>,

    /// Re-read the store every cycle instead of caching its keys.
    #[arg(long, global = true, default_value_t = false)]
    reload_store: bool,
}

impl Overrides {
    /// Defaults, then the config file, then these overrides.
    fn resolve(&self) -> Result<PollerConfig> {
        let mut config = match &self.config {
            Some(path) => PollerConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => PollerConfig::default(),
        };

        if let Some(v) = &self.universe {
            config.universe_path = v.clone();
        }
        if let Some(v) = &self.output {
            config.output_path = v.clone();
        }
        if let Some(v) = &self.cursor_file {
            config.cursor_path = v.clone();
        }
        if let Some(v) = &self.api_key {
            config.api_key = Some(v.clone());
        }
        if let Some(v) = self.start {
            config.start_date = v;
        }
        if let Some(v) = self.end {
            config.end_date = v;
        }
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.interval_secs {
            config.interval_secs = v;
        }
        if let Some(v) = self.fetch_concurrency {
            config.fetch_concurrency = v;
        }
        if self.reload_store {
            config.reload_store = true;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    let config = cli.overrides.resolve()?;

    match cli.command {
        Commands::Run { cycles } => run_poller(&config, cycles),
        Commands::Once => run_once(&config),
        Commands::Status => run_status(&config),
    }
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid --log-level `{directives}`"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .context("installing log subscriber")?;
    Ok(())
}

fn build_job(config: &PollerConfig) -> Result<BatchJob> {
    config.validate().context("invalid configuration")?;

    let universe = Universe::load(&config.universe_path).context("loading ticker universe")?;

    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    let provider = PolygonProvider::new(config.polygon_settings()?, circuit_breaker)
        .context("building Polygon client")?;

    let csv_store = CsvBarStore::new(&config.output_path);
    let store: Box<dyn BarStore> = if config.reload_store {
        Box::new(csv_store)
    } else {
        Box::new(IndexedStore::new(csv_store))
    };

    let settings = BatchSettings {
        batch_size: config.batch_size()?,
        start: config.start_date,
        end: config.end_date,
        fetch_concurrency: config.fetch_concurrency,
    };

    info!(
        tickers = universe.len(),
        batch_size = settings.batch_size.get(),
        start = %settings.start,
        end = %settings.end,
        output = %config.output_path.display(),
        "poller configured"
    );

    BatchJob::new(
        universe,
        Box::new(provider),
        store,
        Box::new(FileCursor::new(&config.cursor_path)),
        settings,
    )
    .context("building fetch thread pool")
}

fn run_poller(config: &PollerConfig, cycles: Option<u64>) -> Result<()> {
    let mut job = build_job(config)?;

    let (scheduler, _shutdown) = Scheduler::new(config.interval());
    let scheduler = match cycles {
        Some(n) => scheduler.with_max_runs(n),
        None => scheduler,
    };

    info!(interval_secs = config.interval_secs, "polling started");
    let summary = scheduler
        .run(|| job.run_once().map(|_| ()))
        .context("polling stopped")?;

    info!(
        runs = summary.runs,
        skipped_ticks = summary.skipped_ticks,
        "polling finished"
    );
    Ok(())
}

fn run_once(config: &PollerConfig) -> Result<()> {
    let mut job = build_job(config)?;
    let report = job.run_once().context("cycle failed")?;

    println!(
        "Fetched {} tickers ({} failed, {} without data): {} rows fetched, {} appended. Next cursor: {}",
        report.attempted.len(),
        report.failures.len(),
        report.no_data.len(),
        report.fetched_rows,
        report.appended_rows,
        report.next_cursor
    );
    Ok(())
}

fn run_status(config: &PollerConfig) -> Result<()> {
    let universe = Universe::load(&config.universe_path).context("loading ticker universe")?;
    let cursor = FileCursor::new(&config.cursor_path).read();
    let range = plan_batch(universe.len(), cursor, config.batch_size()?);
    let next: Vec<&str> = universe.tickers()[range.clone()]
        .iter()
        .map(|t| t.as_str())
        .collect();

    println!("Universe:    {} ({} tickers)", config.universe_path.display(), universe.len());
    println!("Cursor:      {} ({})", cursor, config.cursor_path.display());
    if range.start != cursor {
        println!("             past the end, next cycle restarts from 0");
    }
    println!("Next batch:  {}", next.join(", "));

    let store = CsvBarStore::new(&config.output_path);
    if config.output_path.exists() {
        let rows = store.row_count().context("reading store")?;
        let keys = store.read_keys().context("reading store keys")?;
        println!(
            "Store:       {} ({} rows, {} distinct bars)",
            config.output_path.display(),
            rows,
            keys.len()
        );
    } else {
        println!("Store:       {} (not created yet)", config.output_path.display());
    }
    Ok(())
}
