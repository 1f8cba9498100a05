//! Polling task and tick handling

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// What a single poll tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A fresh attribute query was issued
    Queried,
    /// The device was declared unreachable; polling ends
    Stale,
    /// Nothing to do (not connected)
    Idle,
}

/// Something the scheduler drives once per tick
pub trait PollTarget: Send + Sync + 'static {
    fn on_poll_tick(&self, now: Instant) -> PollOutcome;
}

/// Whether the last successful update is older than `threshold`
///
/// A session that has never received an update is not stale: there is
/// nothing to compare against yet.
pub fn is_stale(last_update: Option<Instant>, now: Instant, threshold: Duration) -> bool {
    match last_update {
        Some(last) => now.saturating_duration_since(last) > threshold,
        None => false,
    }
}

/// A running polling task
///
/// The task holds only a weak reference to its target, so it ends on its own
/// once the target is dropped. Dropping the scheduler stops the task.
#[derive(Debug)]
pub struct PollScheduler {
    /// Display name of the device being polled
    label: Arc<str>,

    /// Tick period
    interval: Duration,

    /// Task handle for the background polling loop
    task_handle: JoinHandle<()>,

    /// Shutdown signal for graceful termination
    shutdown_signal: Arc<AtomicBool>,

    /// When this task was started
    started_at: Instant,

    /// Total number of ticks handled
    poll_count: Arc<AtomicU64>,
}

impl PollScheduler {
    /// Start ticking every `interval`, first tick one interval from now
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start<T: PollTarget>(label: Arc<str>, target: Weak<T>, interval: Duration) -> Self {
        let shutdown_signal = Arc::new(AtomicBool::new(false));
        let poll_count = Arc::new(AtomicU64::new(0));
        let started_at = Instant::now();

        let task_label = Arc::clone(&label);
        let task_shutdown_signal = Arc::clone(&shutdown_signal);
        let task_poll_count = Arc::clone(&poll_count);

        let task_handle = tokio::spawn(async move {
            Self::polling_loop(
                task_label,
                target,
                started_at,
                interval,
                task_shutdown_signal,
                task_poll_count,
            )
            .await;
        });

        Self {
            label,
            interval,
            task_handle,
            shutdown_signal,
            started_at,
            poll_count,
        }
    }

    async fn polling_loop<T: PollTarget>(
        label: Arc<str>,
        target: Weak<T>,
        started_at: Instant,
        interval: Duration,
        shutdown_signal: Arc<AtomicBool>,
        poll_count: Arc<AtomicU64>,
    ) {
        debug!(device = %label, ?interval, "Starting polling task");

        let mut ticker = tokio::time::interval_at(started_at + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let now = ticker.tick().await;

            if shutdown_signal.load(Ordering::Acquire) {
                break;
            }
            let Some(target) = target.upgrade() else {
                break;
            };

            poll_count.fetch_add(1, Ordering::Relaxed);
            let outcome = target.on_poll_tick(now);
            trace!(device = %label, ?outcome, "Poll tick");

            if outcome == PollOutcome::Stale {
                break;
            }
        }

        debug!(device = %label, "Polling task stopped");
    }

    /// Stop the task; no tick runs after this returns
    pub fn stop(&self) {
        self.shutdown_signal.store(true, Ordering::Release);
        self.task_handle.abort();
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn poll_count(&self) -> u64 {
        self.poll_count.load(Ordering::Relaxed)
    }

    /// Check if the task is still running
    pub fn is_running(&self) -> bool {
        !self.task_handle.is_finished()
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
