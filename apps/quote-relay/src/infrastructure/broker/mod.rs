//! In-Memory Broker
//!
//! In-process implementation of [`TransportPort`] with the same delivery
//! semantics as the NATS adapter:
//!
//! - every plain subscriber whose subject matches receives a copy
//! - each queue group receives one copy, handed to its members round-robin
//! - `*` matches exactly one token, `>` matches one or more trailing tokens
//!
//! Selected with the `memory://` endpoint. Never disconnects, so publishes
//! are only refused after [`TransportPort::drain`].

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::application::ports::{
    CloseReason, ConnectionState, Message, Subscription, TransportError, TransportPort,
    validate_subject,
};
use crate::infrastructure::metrics;

/// Default per-subscription delivery buffer.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 1024;

// =============================================================================
// Subject Matching
// =============================================================================

/// Check whether `subject` matches a subscription `pattern`.
#[must_use]
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

// =============================================================================
// Broker
// =============================================================================

#[derive(Debug)]
struct Subscriber {
    sid: u64,
    pattern: String,
    queue_group: Option<String>,
    tx: mpsc::Sender<Message>,
}

#[derive(Debug, Default)]
struct Registry {
    subscribers: Vec<Subscriber>,
    cursors: HashMap<String, usize>,
    next_sid: u64,
    closed: bool,
}

/// Delivery target for one published message.
#[derive(Debug)]
enum Target {
    /// Plain subscriber.
    Single(mpsc::Sender<Message>),
    /// Queue group members, starting with the one whose turn it is.
    Group(Vec<mpsc::Sender<Message>>),
}

impl Registry {
    /// Pick the delivery targets for one message.
    fn route(&mut self, subject: &str) -> Vec<Target> {
        self.subscribers.retain(|s| !s.tx.is_closed());

        let mut targets = Vec::new();
        let mut groups: HashMap<&str, Vec<&mpsc::Sender<Message>>> = HashMap::new();

        for sub in &self.subscribers {
            if !subject_matches(&sub.pattern, subject) {
                continue;
            }
            match sub.queue_group.as_deref() {
                None => targets.push(Target::Single(sub.tx.clone())),
                Some(group) => groups.entry(group).or_default().push(&sub.tx),
            }
        }

        for (group, members) in groups {
            let cursor = self.cursors.entry(group.to_string()).or_insert(0);
            let start = *cursor % members.len();
            *cursor = cursor.wrapping_add(1);

            let ordered = members[start..]
                .iter()
                .chain(&members[..start])
                .map(|tx| (*tx).clone())
                .collect();
            targets.push(Target::Group(ordered));
        }

        targets
    }
}

/// Send to every target. A queue group message goes to the next member
/// when the chosen one has gone away since routing.
async fn deliver(targets: Vec<Target>, subject: &str, payload: &Bytes) {
    for target in targets {
        let message = Message {
            subject: subject.to_string(),
            payload: payload.clone(),
        };
        match target {
            // Receiver dropped between routing and delivery; nothing to do.
            Target::Single(tx) => {
                let _ = tx.send(message).await;
            }
            Target::Group(members) => {
                let mut message = message;
                let mut delivered = false;
                for tx in members {
                    match tx.send(message).await {
                        Ok(()) => {
                            delivered = true;
                            break;
                        }
                        Err(mpsc::error::SendError(returned)) => message = returned,
                    }
                }
                if !delivered {
                    tracing::debug!(subject, "No live queue member for message");
                }
            }
        }
    }
}

/// In-process publish/subscribe broker.
#[derive(Debug)]
pub struct InMemoryBroker {
    registry: Mutex<Registry>,
    capacity: usize,
    closed_tx: watch::Sender<Option<CloseReason>>,
}

impl InMemoryBroker {
    /// Create a broker with the default subscription buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIPTION_CAPACITY)
    }

    /// Create a broker with a custom subscription buffer.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (closed_tx, _) = watch::channel(None);
        metrics::set_transport_state(ConnectionState::Connected);
        Self {
            registry: Mutex::new(Registry::default()),
            capacity: capacity.max(1),
            closed_tx,
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        let registry = self.registry.lock();
        registry
            .subscribers
            .iter()
            .filter(|s| !s.tx.is_closed())
            .count()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportPort for InMemoryBroker {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError> {
        validate_subject(subject)?;

        let targets = {
            let mut registry = self.registry.lock();
            if registry.closed {
                return Err(TransportError::Closed);
            }
            registry.route(subject)
        };

        deliver(targets, subject, &payload).await;
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        queue_group: Option<&str>,
    ) -> Result<Subscription, TransportError> {
        validate_subject(subject)?;
        if let Some(group) = queue_group {
            validate_subject(group)?;
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        let mut registry = self.registry.lock();
        if registry.closed {
            return Err(TransportError::Closed);
        }

        registry.next_sid += 1;
        let sid = registry.next_sid;
        registry.subscribers.push(Subscriber {
            sid,
            pattern: subject.to_string(),
            queue_group: queue_group.map(str::to_string),
            tx,
        });

        tracing::debug!(sid, subject, queue_group, "In-memory subscription added");

        Ok(Subscription::new(
            sid,
            subject.to_string(),
            queue_group.map(str::to_string),
            rx,
        ))
    }

    async fn drain(&self) -> Result<(), TransportError> {
        let drained = {
            let mut registry = self.registry.lock();
            if registry.closed {
                return Ok(());
            }
            registry.closed = true;
            std::mem::take(&mut registry.subscribers)
        };

        tracing::info!(subscriptions = drained.len(), "In-memory broker drained");
        drop(drained);

        metrics::set_transport_state(ConnectionState::Closed);
        self.closed_tx.send_replace(Some(CloseReason::Drained));
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        if self.registry.lock().closed {
            ConnectionState::Closed
        } else {
            ConnectionState::Connected
        }
    }

    fn closed(&self) -> watch::Receiver<Option<CloseReason>> {
        self.closed_tx.subscribe()
    }
}

// =============================================================================
// Tests
// =============================================================================
