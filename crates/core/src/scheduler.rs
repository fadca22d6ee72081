//! Fixed-interval cycle scheduler with a single-flight guard.
//!
//! Every tick tries to claim the running flag. A tick that finds a cycle
//! still in flight is skipped, not queued. The flag is released by a drop
//! guard owned by the cycle task, so a failed or panicking cycle never
//! leaves it set.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::orchestrator::BatchOrchestrator;

/// Something the scheduler can run once per tick.
#[async_trait]
pub trait CycleRunner: Send + Sync + 'static {
    async fn run_cycle(&self) -> Result<()>;
}

#[async_trait]
impl CycleRunner for BatchOrchestrator {
    async fn run_cycle(&self) -> Result<()> {
        let start = Instant::now();
        let report = BatchOrchestrator::run_cycle(self).await?;

        info!(
            started_at = %report.started_at,
            candidates = report.candidates,
            fetched = report.fetched,
            fetch_failures = report.fetch_failures,
            filtered_out = report.filtered_out,
            skipped_unprofitable = report.skipped_unprofitable,
            no_route = report.no_route,
            executed = report.executed,
            execution_failures = report.execution_failures,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Liquidation cycle complete"
        );
        Ok(())
    }
}

struct Shared {
    runner: Arc<dyn CycleRunner>,
    running: AtomicBool,
}

/// Clears the running flag when dropped.
struct RunningGuard {
    shared: Arc<Shared>,
}

impl RunningGuard {
    fn acquire(shared: &Arc<Shared>) -> Option<Self> {
        shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self {
            shared: shared.clone(),
        })
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
    }
}

/// Runs a [`CycleRunner`] on a fixed interval, never two at once.
pub struct CycleScheduler {
    shared: Arc<Shared>,
    shutdown: Option<watch::Sender<bool>>,
    ticker: Option<JoinHandle<()>>,
}

impl CycleScheduler {
    pub fn new(runner: Arc<dyn CycleRunner>) -> Self {
        Self {
            shared: Arc::new(Shared {
                runner,
                running: AtomicBool::new(false),
            }),
            shutdown: None,
            ticker: None,
        }
    }

    /// A cycle is currently in flight.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Start a cycle now unless one is already running.
    ///
    /// Returns the handle of the spawned cycle, or `None` when skipped.
    pub fn try_trigger(&self) -> Option<JoinHandle<()>> {
        trigger(&self.shared)
    }

    /// Start ticking. The first cycle starts immediately.
    pub fn start(&mut self, period: Duration) {
        if self.ticker.is_some() {
            warn!("Scheduler already started");
            return;
        }

        let (tx, mut rx) = watch::channel(false);
        let shared = self.shared.clone();

        let ticker = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut in_flight: Option<JoinHandle<()>> = None;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Some(handle) = trigger(&shared) {
                            in_flight = Some(handle);
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }

            if let Some(handle) = in_flight.take() {
                if !handle.is_finished() {
                    info!("Waiting for in-flight liquidation cycle");
                }
                if let Err(e) = handle.await {
                    error!(error = %e, "Liquidation cycle task aborted");
                }
            }
        });

        info!(interval_secs = period.as_secs_f64(), "Liquidation scheduler started");
        self.shutdown = Some(tx);
        self.ticker = Some(ticker);
    }

    /// Stop ticking and wait for any in-flight cycle to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(ticker) = self.ticker.take() {
            if let Err(e) = ticker.await {
                error!(error = %e, "Scheduler task aborted");
            }
        }
        info!("Liquidation scheduler stopped");
    }
}

fn trigger(shared: &Arc<Shared>) -> Option<JoinHandle<()>> {
    let Some(guard) = RunningGuard::acquire(shared) else {
        info!("Liquidation cycle already running, skipping this trigger");
        return None;
    };

    let runner = shared.runner.clone();
    Some(tokio::spawn(async move {
        let _guard = guard;
        let start = Instant::now();
        match runner.run_cycle().await {
            Ok(()) => debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Cycle finished"),
            Err(e) => error!(error = %format!("{e:#}"), "Liquidation cycle failed"),
        }
    }))
}
