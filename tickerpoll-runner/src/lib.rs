//! tickerpoll runner: batch cycles, configuration and the polling scheduler.
//!
//! This crate builds on `tickerpoll-core` to provide:
//! - `PollerConfig` with TOML loading and validation
//! - The batch cycle (`BatchJob`) with cursor persistence and per-ticker
//!   failure isolation
//! - Per-cycle reporting
//! - The fixed-interval, non-reentrant scheduler

pub mod batch;
pub mod config;
pub mod report;
pub mod scheduler;

pub use batch::{next_cursor, plan_batch, BatchJob, BatchSettings, CycleError};
pub use config::{ConfigError, PollerConfig, ProviderConfig, MAX_RETRIES};
pub use report::CycleReport;
pub use scheduler::{RunSummary, Scheduler, ShutdownHandle};
