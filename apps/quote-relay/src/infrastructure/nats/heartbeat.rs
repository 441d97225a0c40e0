//! Heartbeat Manager
//!
//! Keeps the NATS connection honest with periodic `PING`s. Each `PONG`
//! clears the outstanding count; when too many pings go unanswered the
//! connection is considered stale and gets restarted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
    /// Unanswered pings tolerated before the connection is declared stale.
    pub max_pings_out: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            max_pings_out: 2,
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, max_pings_out: u32) -> Self {
        Self {
            ping_interval,
            max_pings_out,
        }
    }
}

/// Events emitted by the heartbeat manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a `PING`.
    SendPing,
    /// Too many pings unanswered; restart the connection.
    Stale,
}

/// Outstanding ping count shared with the connection loop.
#[derive(Debug, Default)]
pub struct HeartbeatState {
    pings_out: AtomicU32,
}

impl HeartbeatState {
    /// Create new heartbeat state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pings_out: AtomicU32::new(0),
        }
    }

    /// Record that a `PONG` was received.
    pub fn record_pong(&self) {
        self.pings_out.store(0, Ordering::SeqCst);
    }

    /// Record that a `PING` was sent.
    pub fn mark_ping_sent(&self) {
        self.pings_out.fetch_add(1, Ordering::SeqCst);
    }

    /// Pings sent since the last `PONG`.
    #[must_use]
    pub fn pings_out(&self) -> u32 {
        self.pings_out.load(Ordering::SeqCst)
    }
}

/// Heartbeat manager that monitors connection health.
///
/// Runs as its own task per connection and is cancelled when the
/// connection ends.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run the heartbeat loop until cancelled or the connection goes stale.
    ///
    /// The first ping goes out one interval after start.
    pub async fn run(self) {
        let start = Instant::now() + self.config.ping_interval;
        let mut interval = tokio::time::interval_at(start, self.config.ping_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat manager cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.check_and_ping().await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Check for a stale connection and request a ping otherwise.
    ///
    /// Returns `Err(())` if the loop should exit.
    async fn check_and_ping(&self) -> Result<(), ()> {
        let outstanding = self.state.pings_out();
        if outstanding >= self.config.max_pings_out {
            tracing::warn!(
                pings_out = outstanding,
                max_pings_out = self.config.max_pings_out,
                "Heartbeat stale, no PONG received"
            );
            let _ = self.event_tx.send(HeartbeatEvent::Stale).await;
            return Err(());
        }

        if self.event_tx.send(HeartbeatEvent::SendPing).await.is_err() {
            tracing::debug!("Event channel closed, stopping heartbeat");
            return Err(());
        }

        Ok(())
    }
}

impl std::fmt::Debug for HeartbeatManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatManager")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
