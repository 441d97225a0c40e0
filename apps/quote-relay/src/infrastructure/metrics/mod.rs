//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Refresh**: Cycle outcomes and fetch latency
//! - **Events**: Published, consumed and dropped update events
//! - **Store**: Samples persisted
//! - **Transport**: Connection state and reconnects
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::ports::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Refresh
    describe_counter!(
        "quote_relay_refresh_cycles_total",
        "Refresh cycles by trigger and outcome"
    );
    describe_histogram!(
        "quote_relay_fetch_duration_seconds",
        "Time spent fetching quotes from the external source"
    );

    // Events
    describe_counter!(
        "quote_relay_events_published_total",
        "Update events published"
    );
    describe_counter!(
        "quote_relay_publish_failures_total",
        "Update events that failed to publish"
    );
    describe_counter!(
        "quote_relay_events_consumed_total",
        "Update events received by consumer members"
    );
    describe_counter!(
        "quote_relay_events_dropped_total",
        "Update events dropped by reason"
    );

    // Store
    describe_counter!("quote_relay_samples_stored_total", "Samples persisted");

    // Transport
    describe_gauge!(
        "quote_relay_transport_state",
        "Transport state (0 disconnected, 1 connecting, 2 connected, 3 reconnecting, 4 closed)"
    );
    describe_counter!(
        "quote_relay_transport_reconnects_total",
        "Transport reconnection attempts"
    );
    describe_counter!(
        "quote_relay_transport_discarded_total",
        "Queued commands dropped by a drain while disconnected"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every sample was published.
    Published,
    /// Fetch succeeded but some publishes failed.
    Partial,
    /// Fetch failed and the cycle was dropped.
    FetchFailed,
}

impl CycleOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Partial => "partial",
            Self::FetchFailed => "fetch_failed",
        }
    }
}

/// Reason label for a dropped event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Payload did not decode.
    Decode,
    /// Store rejected the append.
    Store,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Store => "store",
        }
    }
}

/// Record a finished refresh cycle.
pub fn record_refresh_cycle(trigger: &'static str, outcome: CycleOutcome) {
    counter!(
        "quote_relay_refresh_cycles_total",
        "trigger" => trigger,
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record fetch duration.
pub fn record_fetch_duration(duration: Duration) {
    histogram!("quote_relay_fetch_duration_seconds").record(duration.as_secs_f64());
}

/// Record published events.
pub fn record_events_published(count: u64) {
    counter!("quote_relay_events_published_total").increment(count);
}

/// Record a failed publish.
pub fn record_publish_failure(error_type: &'static str) {
    counter!(
        "quote_relay_publish_failures_total",
        "error_type" => error_type
    )
    .increment(1);
}

/// Record an event received by a consumer member.
pub fn record_event_consumed() {
    counter!("quote_relay_events_consumed_total").increment(1);
}

/// Record a dropped event.
pub fn record_event_dropped(reason: DropReason) {
    counter!(
        "quote_relay_events_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record persisted samples.
pub fn record_samples_stored(count: u64) {
    counter!("quote_relay_samples_stored_total").increment(count);
}

/// Update the transport state gauge.
pub fn set_transport_state(state: ConnectionState) {
    gauge!("quote_relay_transport_state").set(state.as_gauge());
}

/// Record a transport reconnection attempt.
pub fn record_reconnect() {
    counter!("quote_relay_transport_reconnects_total").increment(1);
}

/// Record queued commands dropped by a drain while disconnected.
pub fn record_commands_discarded(count: u64) {
    counter!("quote_relay_transport_discarded_total").increment(count);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_outcome_as_str() {
        assert_eq!(CycleOutcome::Published.as_str(), "published");
        assert_eq!(CycleOutcome::Partial.as_str(), "partial");
        assert_eq!(CycleOutcome::FetchFailed.as_str(), "fetch_failed");
    }

    #[test]
    fn drop_reason_as_str() {
        assert_eq!(DropReason::Decode.as_str(), "decode");
        assert_eq!(DropReason::Store.as_str(), "store");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_event_consumed();
        record_event_dropped(DropReason::Decode);
        set_transport_state(ConnectionState::Connected);
        record_commands_discarded(3);
    }
}
