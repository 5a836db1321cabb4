//! Periodic runner for a [`Sweep`].
//!
//! Each [`Monitor`] owns its timer task, its shutdown channel and its
//! in-flight flag, so any number of independent monitors can run side by
//! side and be torn down cleanly.
//!
//! - The first run starts right after [`Monitor::start`].
//! - A run never overlaps another run of the same monitor; an overlapping
//!   trigger is skipped.
//! - Ticks missed while a slow run was going are dropped, not replayed.
//! - [`Monitor::stop`] stops scheduling and waits for a run in progress.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::processor::sweep::{Sweep, SweepReport};

#[derive(Default)]
struct MonitorState {
    in_flight: AtomicBool,
    runs: AtomicU64,
    last_run_at: Mutex<Option<DateTime<Utc>>>,
    last_report: Mutex<Option<SweepReport>>,
}

/// Holds the in-flight flag for the duration of one run.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorStatus {
    pub name: String,
    pub period_secs: u64,
    pub running: bool,
    pub in_flight: bool,
    pub runs: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_report: Option<SweepReport>,
}

pub struct Monitor {
    name: String,
    period: Duration,
    sweep: Arc<dyn Sweep>,
    state: Arc<MonitorState>,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl Monitor {
    pub fn new(name: impl Into<String>, period: Duration, sweep: Arc<dyn Sweep>) -> Self {
        Self {
            name: name.into(),
            period,
            sweep,
            state: Arc::new(MonitorState::default()),
            shutdown: None,
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawns the polling task. Returns false if it is already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }

        let (tx, mut rx) = watch::channel(false);
        let name = self.name.clone();
        let period = self.period;
        let sweep = self.sweep.clone();
        let state = self.state.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;

                    _ = rx.changed() => break,

                    // the run completes before shutdown is looked at again
                    _ = ticker.tick() => {
                        run_guarded(&name, sweep.as_ref(), &state, Utc::now()).await;
                    }
                }
            }

            info!(monitor = %name, "Monitor stopped");
        });

        info!(monitor = %self.name, period_secs = self.period.as_secs(), "Monitor started");
        self.shutdown = Some(tx);
        self.handle = Some(handle);
        true
    }

    /// Prevents further runs and waits for a run already in progress.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(monitor = %self.name, error = %e, "Monitor task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Runs one sweep now, outside the schedule. `None` if a run is already in flight.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Option<SweepReport> {
        run_guarded(&self.name, self.sweep.as_ref(), &self.state, now).await
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            name: self.name.clone(),
            period_secs: self.period.as_secs(),
            running: self.is_running(),
            in_flight: self.state.in_flight.load(Ordering::Acquire),
            runs: self.state.runs.load(Ordering::Acquire),
            last_run_at: *lock(&self.state.last_run_at),
            last_report: lock(&self.state.last_report).clone(),
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        // lets the task exit after its current run
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_guarded(
    name: &str,
    sweep: &dyn Sweep,
    state: &MonitorState,
    now: DateTime<Utc>,
) -> Option<SweepReport> {
    let Some(_guard) = InFlightGuard::acquire(&state.in_flight) else {
        debug!(monitor = %name, "Previous run still in flight, skipping");
        return None;
    };

    let started = Instant::now();
    let report = sweep.sweep(now).await;

    state.runs.fetch_add(1, Ordering::AcqRel);
    *lock(&state.last_run_at) = Some(now);
    *lock(&state.last_report) = Some(report.clone());

    if report.fetch_failed || report.failed > 0 {
        warn!(
            monitor = %name,
            scanned = report.scanned,
            failed = report.failed,
            fetch_failed = report.fetch_failed,
            "Monitor run finished with failures, retrying next cycle"
        );
    } else {
        info!(
            monitor = %name,
            scanned = report.scanned,
            raised = report.raised,
            escalated = report.escalated,
            duplicates = report.duplicates,
            skipped = report.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Monitor run finished"
        );
    }

    Some(report)
}
