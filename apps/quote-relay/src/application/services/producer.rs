//! Quote Producer
//!
//! One refresh cycle: fetch every tracked symbol, then publish one update
//! event per sample in fetch order.
//!
//! A fetch failure drops the whole cycle; the next trigger is the retry.
//! A publish failure only affects its own symbol.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;

use super::scheduler::{RefreshHandler, Trigger};
use crate::application::ports::{FetchError, QuoteSourcePort, TransportPort};
use crate::domain::quote::{TrackedSet, UpdateEventCodec};
use crate::infrastructure::metrics::{self, CycleOutcome};

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// What caused the cycle.
    pub trigger: Trigger,
    /// Samples returned by the fetcher.
    pub fetched: usize,
    /// Events published.
    pub published: usize,
    /// Events that failed to encode or publish.
    pub failed: usize,
}

impl CycleReport {
    const fn outcome(&self) -> CycleOutcome {
        if self.failed == 0 {
            CycleOutcome::Published
        } else {
            CycleOutcome::Partial
        }
    }
}

/// Fetches quotes and publishes them as update events.
pub struct Producer {
    source: Arc<dyn QuoteSourcePort>,
    transport: Arc<dyn TransportPort>,
    codec: UpdateEventCodec,
    tracked: TrackedSet,
    subject: String,
}

impl Producer {
    /// Create a producer publishing on `subject`.
    #[must_use]
    pub fn new(
        source: Arc<dyn QuoteSourcePort>,
        transport: Arc<dyn TransportPort>,
        tracked: TrackedSet,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            source,
            transport,
            codec: UpdateEventCodec::new(tracked.clone()),
            tracked,
            subject: subject.into(),
        }
    }

    /// Run one refresh cycle.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the fetch failed; nothing is published in
    /// that case.
    pub async fn run_cycle(&self, trigger: Trigger) -> Result<CycleReport, FetchError> {
        let started = Instant::now();
        let fetched = self.source.fetch(self.tracked.symbols()).await;
        metrics::record_fetch_duration(started.elapsed());

        let samples = fetched?;
        let mut report = CycleReport {
            trigger,
            fetched: samples.len(),
            published: 0,
            failed: 0,
        };

        for sample in &samples {
            let payload = match self.codec.encode(sample) {
                Ok(bytes) => Bytes::from(bytes),
                Err(e) => {
                    tracing::error!(symbol = %sample.symbol(), error = %e, "Failed to encode update event");
                    metrics::record_publish_failure("encode");
                    report.failed += 1;
                    continue;
                }
            };

            match self.transport.publish(&self.subject, payload).await {
                Ok(()) => {
                    tracing::debug!(
                        symbol = %sample.symbol(),
                        price = sample.price(),
                        "Published update event"
                    );
                    report.published += 1;
                }
                Err(e) => {
                    tracing::warn!(symbol = %sample.symbol(), error = %e, "Failed to publish update event");
                    metrics::record_publish_failure("transport");
                    report.failed += 1;
                }
            }
        }

        metrics::record_events_published(report.published as u64);

        Ok(report)
    }
}

#[async_trait]
impl RefreshHandler for Producer {
    async fn refresh(&self, trigger: Trigger) {
        match self.run_cycle(trigger).await {
            Ok(report) => {
                tracing::info!(
                    trigger = trigger.as_str(),
                    fetched = report.fetched,
                    published = report.published,
                    failed = report.failed,
                    "Refresh cycle complete"
                );
                metrics::record_refresh_cycle(trigger.as_str(), report.outcome());
            }
            Err(e) => {
                tracing::warn!(
                    trigger = trigger.as_str(),
                    error = %e,
                    error_kind = e.kind(),
                    "Refresh cycle dropped"
                );
                metrics::record_refresh_cycle(trigger.as_str(), CycleOutcome::FetchFailed);
            }
        }
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("subject", &self.subject)
            .field("tracked", &self.tracked)
            .finish_non_exhaustive()
    }
}
