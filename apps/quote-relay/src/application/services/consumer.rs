//! Consumer Group
//!
//! Members subscribe under a shared queue group, so each update event is
//! handled by exactly one member across every process in the group.
//!
//! Per-message failures never end a member: malformed events are logged and
//! dropped, store failures are logged and the loop moves on. A member only
//! stops when its subscription stream ends (drain, close, or fatal close).

use std::ops::AddAssign;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::application::ports::{
    Message, QuoteStorePort, Subscription, TransportError, TransportPort,
};
use crate::domain::quote::UpdateEventCodec;
use crate::infrastructure::metrics::{self, DropReason};

/// Per-member counters, returned when the member stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Events received.
    pub consumed: u64,
    /// Samples appended to the store.
    pub stored: u64,
    /// Events that failed to decode.
    pub malformed: u64,
    /// Samples the store rejected.
    pub store_failures: u64,
}

impl AddAssign for ConsumerStats {
    fn add_assign(&mut self, rhs: Self) {
        self.consumed += rhs.consumed;
        self.stored += rhs.stored;
        self.malformed += rhs.malformed;
        self.store_failures += rhs.store_failures;
    }
}

/// A single queue-group member.
pub struct ConsumerMember {
    id: usize,
    subscription: Subscription,
    store: Arc<dyn QuoteStorePort>,
    codec: UpdateEventCodec,
    stats: ConsumerStats,
}

impl ConsumerMember {
    /// Create a member reading from an established subscription.
    #[must_use]
    pub fn new(
        id: usize,
        subscription: Subscription,
        store: Arc<dyn QuoteStorePort>,
        codec: UpdateEventCodec,
    ) -> Self {
        Self {
            id,
            subscription,
            store,
            codec,
            stats: ConsumerStats::default(),
        }
    }

    /// Process messages until the subscription ends.
    pub async fn run(mut self) -> ConsumerStats {
        tracing::info!(
            member = self.id,
            subject = self.subscription.subject(),
            queue_group = self.subscription.queue_group().unwrap_or(""),
            "Consumer member started"
        );

        while let Some(message) = self.subscription.recv().await {
            self.handle(&message).await;
        }

        tracing::info!(
            member = self.id,
            consumed = self.stats.consumed,
            stored = self.stats.stored,
            malformed = self.stats.malformed,
            store_failures = self.stats.store_failures,
            "Consumer member stopped"
        );
        self.stats
    }

    async fn handle(&mut self, message: &Message) {
        self.stats.consumed += 1;
        metrics::record_event_consumed();

        let samples = match self.codec.decode(&message.payload) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(
                    member = self.id,
                    subject = %message.subject,
                    error = %e,
                    "Dropping malformed update event"
                );
                self.stats.malformed += 1;
                metrics::record_event_dropped(DropReason::Decode);
                return;
            }
        };

        for sample in &samples {
            match self.store.append(sample).await {
                Ok(sequence) => {
                    tracing::debug!(
                        member = self.id,
                        symbol = %sample.symbol(),
                        price = sample.price(),
                        sequence,
                        "Sample stored"
                    );
                    self.stats.stored += 1;
                    metrics::record_samples_stored(1);
                }
                Err(e) => {
                    tracing::error!(
                        member = self.id,
                        symbol = %sample.symbol(),
                        error = %e,
                        "Failed to store sample"
                    );
                    self.stats.store_failures += 1;
                    metrics::record_event_dropped(DropReason::Store);
                }
            }
        }
    }
}

impl std::fmt::Debug for ConsumerMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerMember")
            .field("id", &self.id)
            .field("subscription", &self.subscription)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// The consumer members running in this process.
#[derive(Debug)]
pub struct ConsumerGroup {
    members: JoinSet<ConsumerStats>,
}

impl ConsumerGroup {
    /// Subscribe `workers` members under `queue_group` and start them.
    ///
    /// A worker count of zero starts one member.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if any subscription fails.
    pub async fn start(
        transport: &dyn TransportPort,
        store: Arc<dyn QuoteStorePort>,
        codec: &UpdateEventCodec,
        subject: &str,
        queue_group: &str,
        workers: usize,
    ) -> Result<Self, TransportError> {
        let mut members = JoinSet::new();

        for id in 0..workers.max(1) {
            let subscription = transport.subscribe(subject, Some(queue_group)).await?;
            let member = ConsumerMember::new(id, subscription, Arc::clone(&store), codec.clone());
            members.spawn(member.run());
        }

        tracing::info!(
            members = members.len(),
            subject,
            queue_group,
            "Consumer group started"
        );

        Ok(Self { members })
    }

    /// Number of running members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether no member is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Wait for every member to stop and sum their counters.
    pub async fn join(mut self) -> ConsumerStats {
        let mut total = ConsumerStats::default();
        while let Some(result) = self.members.join_next().await {
            match result {
                Ok(stats) => total += stats,
                Err(e) => tracing::error!(error = %e, "Consumer member task failed"),
            }
        }
        total
    }
}
