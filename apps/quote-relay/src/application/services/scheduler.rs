//! Refresh Scheduler
//!
//! Fires a refresh immediately at startup and then on a fixed interval.
//! Every trigger is dispatched on its own task, so a slow refresh never
//! delays the next tick and refreshes may overlap.
//!
//! ```text
//! Idle ──(tick / manual)──► Triggering ──(handler returns)──► Idle
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Interval used when none (or an invalid one) is configured.
pub const DEFAULT_REFRESH_INTERVAL_MINUTES: u64 = 15;

const MANUAL_TRIGGER_BUFFER: usize = 16;

/// What caused a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// The immediate refresh at startup.
    Startup,
    /// A periodic timer tick.
    Interval,
    /// Requested through a [`TriggerHandle`].
    Manual,
}

impl Trigger {
    /// Lowercase label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Interval => "interval",
            Self::Manual => "manual",
        }
    }
}

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No refresh running.
    Idle,
    /// At least one refresh running.
    Triggering,
}

/// Work performed on each trigger.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RefreshHandler: Send + Sync {
    /// Run one refresh.
    async fn refresh(&self, trigger: Trigger);
}

/// Manual trigger request was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    /// Too many manual requests pending.
    #[error("too many refresh requests pending")]
    Busy,
    /// The scheduler is no longer running.
    #[error("scheduler stopped")]
    Stopped,
}

/// Cloneable handle for requesting a refresh outside the timer.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<()>,
}

impl TriggerHandle {
    /// Request a manual refresh.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError`] if the request queue is full or the
    /// scheduler has stopped.
    pub fn trigger(&self) -> Result<(), TriggerError> {
        self.tx.try_send(()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => TriggerError::Busy,
            mpsc::error::TrySendError::Closed(()) => TriggerError::Stopped,
        })
    }
}

/// Interval-driven refresh scheduler.
pub struct Scheduler {
    interval: Duration,
    handler: Arc<dyn RefreshHandler>,
    manual_tx: mpsc::Sender<()>,
    manual_rx: mpsc::Receiver<()>,
    in_flight: Arc<AtomicUsize>,
}

impl Scheduler {
    /// Create a scheduler firing every `interval_minutes`.
    ///
    /// An interval below one minute is replaced with
    /// [`DEFAULT_REFRESH_INTERVAL_MINUTES`].
    #[must_use]
    pub fn new(interval_minutes: u64, handler: Arc<dyn RefreshHandler>) -> Self {
        let minutes = if interval_minutes < 1 {
            tracing::warn!(
                configured = interval_minutes,
                using = DEFAULT_REFRESH_INTERVAL_MINUTES,
                "Invalid refresh interval, using default"
            );
            DEFAULT_REFRESH_INTERVAL_MINUTES
        } else {
            interval_minutes
        };

        let (manual_tx, manual_rx) = mpsc::channel(MANUAL_TRIGGER_BUFFER);

        Self {
            interval: Duration::from_secs(minutes * 60),
            handler,
            manual_tx,
            manual_rx,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Effective interval between timer triggers.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Handle for manual triggers.
    #[must_use]
    pub fn trigger_handle(&self) -> TriggerHandle {
        TriggerHandle {
            tx: self.manual_tx.clone(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            SchedulerState::Triggering
        } else {
            SchedulerState::Idle
        }
    }

    /// Run until cancelled, then wait for in-flight refreshes to finish.
    pub async fn run(mut self, cancel: CancellationToken) {
        let tracker = TaskTracker::new();
        let mut ticker = tokio::time::interval_at(Instant::now(), self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next = Trigger::Startup;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Refresh scheduler started"
        );

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    self.dispatch(&tracker, next);
                    next = Trigger::Interval;
                }

                Some(()) = self.manual_rx.recv() => {
                    self.dispatch(&tracker, Trigger::Manual);
                }
            }
        }

        tracker.close();
        if !tracker.is_empty() {
            tracing::info!(
                in_flight = tracker.len(),
                "Waiting for in-flight refreshes"
            );
        }
        tracker.wait().await;
        tracing::info!("Refresh scheduler stopped");
    }

    fn dispatch(&self, tracker: &TaskTracker, trigger: Trigger) {
        tracing::debug!(trigger = trigger.as_str(), "Dispatching refresh");

        let handler = Arc::clone(&self.handler);
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);

        tracker.spawn(async move {
            handler.refresh(trigger).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("interval", &self.interval)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
