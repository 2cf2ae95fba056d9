//! Fixed-interval scheduler for the batch job.
//!
//! Runs the job once immediately, then at `start + k * interval`. Cycles run on
//! the calling thread, so a new cycle never starts while one is executing;
//! ticks that pass during an overrunning cycle are skipped rather than queued.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Stops a running [`Scheduler`] at its next wait. Dropping the handle does
/// not stop the scheduler.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Sender<()>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }
}

/// Totals for a finished scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub runs: u64,
    pub skipped_ticks: u64,
}

pub struct Scheduler {
    interval: Duration,
    max_runs: Option<u64>,
    shutdown_rx: Receiver<()>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> (Self, ShutdownHandle) {
        let (tx, rx) = mpsc::channel();
        let scheduler = Self {
            interval: interval.max(Duration::from_millis(1)),
            max_runs: None,
            shutdown_rx: rx,
        };
        (scheduler, ShutdownHandle { tx })
    }

    /// Stop after `n` runs. With `n == 0` the job never runs.
    pub fn with_max_runs(mut self, n: u64) -> Self {
        self.max_runs = Some(n);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Drive `job` until shutdown, `max_runs`, or the first job error.
    pub fn run<E, F>(&self, mut job: F) -> Result<RunSummary, E>
    where
        F: FnMut() -> Result<(), E>,
    {
        let mut summary = RunSummary {
            runs: 0,
            skipped_ticks: 0,
        };
        let limit_reached = |runs: u64| self.max_runs.is_some_and(|max| runs >= max);
        let mut next_tick = Instant::now();
        let mut cancellable = true;

        while !limit_reached(summary.runs) {
            job()?;
            summary.runs += 1;

            if limit_reached(summary.runs) {
                break;
            }

            let now = Instant::now();
            let (tick, skipped) = next_tick_after(next_tick, now, self.interval);
            next_tick = tick;
            summary.skipped_ticks += skipped;
            if skipped > 0 {
                debug!(skipped, "cycle overran the interval");
            }

            let wait = next_tick.saturating_duration_since(now);
            if cancellable {
                match self.shutdown_rx.recv_timeout(wait) {
                    Ok(()) => {
                        info!(runs = summary.runs, "scheduler shut down");
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        cancellable = false;
                        std::thread::sleep(next_tick.saturating_duration_since(Instant::now()));
                    }
                }
            } else {
                std::thread::sleep(wait);
            }
        }

        Ok(summary)
    }
}

/// The first tick after `previous` that is still in the future at `now`,
/// and how many ticks were passed over to reach it.
fn next_tick_after(previous: Instant, now: Instant, interval: Duration) -> (Instant, u64) {
    let mut tick = previous + interval;
    let mut skipped = 0;
    while tick <= now {
        tick += interval;
        skipped += 1;
    }
    (tick, skipped)
}
