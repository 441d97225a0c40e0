//! Transport Port (Driven Port)
//!
//! Interface for the publish/subscribe broker connection.
//!
//! A transport is an owned handle created once at startup and shared behind
//! an `Arc`. Transient disconnects are handled inside the adapter; callers
//! only observe them through [`TransportPort::state`].

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, watch};

/// Connection state, owned by the transport adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected and not trying.
    #[default]
    Disconnected,
    /// Initial connection in progress.
    Connecting,
    /// Connected and ready.
    Connected,
    /// Connection lost, retrying.
    Reconnecting,
    /// Drained or closed for good.
    Closed,
}

impl ConnectionState {
    /// Lowercase name used in logs and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    /// Numeric value for the state gauge.
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Reconnecting => 3.0,
            Self::Closed => 4.0,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transport closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed by [`TransportPort::drain`].
    Drained,
    /// Closed by the server or by exhausting the reconnect limit.
    Fatal(String),
}

/// Transport error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Initial connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The outbound command buffer is full.
    #[error("publish buffer full ({capacity} pending commands)")]
    BufferFull {
        /// Configured buffer capacity.
        capacity: usize,
    },

    /// The transport has been drained or closed.
    #[error("transport closed")]
    Closed,

    /// Drain finished without a connection; queued commands were dropped.
    #[error("drained while disconnected, {count} queued commands dropped")]
    Discarded {
        /// Commands accepted but never written.
        count: usize,
    },

    /// Subject or queue group contains whitespace or is empty.
    #[error("invalid subject: '{0}'")]
    InvalidSubject(String),

    /// Protocol violation reported by or detected on the connection.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// A delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Subject the message was published on.
    pub subject: String,
    /// Raw payload.
    pub payload: Bytes,
}

/// Live binding of a subject and optional queue group to a delivery stream.
///
/// The stream ends when the transport is drained or closed.
#[derive(Debug)]
pub struct Subscription {
    sid: u64,
    subject: String,
    queue_group: Option<String>,
    rx: mpsc::Receiver<Message>,
}

impl Subscription {
    /// Wrap a delivery channel. Used by transport adapters.
    #[must_use]
    pub const fn new(
        sid: u64,
        subject: String,
        queue_group: Option<String>,
        rx: mpsc::Receiver<Message>,
    ) -> Self {
        Self {
            sid,
            subject,
            queue_group,
            rx,
        }
    }

    /// Adapter-assigned subscription id.
    #[must_use]
    pub const fn sid(&self) -> u64 {
        self.sid
    }

    /// Subscribed subject (may contain wildcards).
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Queue group, if any.
    #[must_use]
    pub fn queue_group(&self) -> Option<&str> {
        self.queue_group.as_deref()
    }

    /// Receive the next message, or `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Port for a publish/subscribe transport.
#[async_trait]
pub trait TransportPort: Send + Sync {
    /// Publish a payload on a subject.
    ///
    /// While reconnecting, publishes are queued up to the configured buffer
    /// size; beyond that this fails with [`TransportError::BufferFull`].
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Subscribe to a subject, optionally as a member of a queue group.
    ///
    /// Members of the same queue group share the message flow: each message
    /// is delivered to exactly one of them.
    async fn subscribe(
        &self,
        subject: &str,
        queue_group: Option<&str>,
    ) -> Result<Subscription, TransportError>;

    /// Flush pending publishes, end all subscriptions and close.
    async fn drain(&self) -> Result<(), TransportError>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Observe the close reason. The value is `None` until the transport
    /// closes and is set exactly once.
    fn closed(&self) -> watch::Receiver<Option<CloseReason>>;
}

/// Check a subject or queue group token for the wire format.
///
/// # Errors
///
/// Returns [`TransportError::InvalidSubject`] if the value is empty or
/// contains whitespace.
pub fn validate_subject(subject: &str) -> Result<(), TransportError> {
    if subject.is_empty() || subject.chars().any(char::is_whitespace) {
        return Err(TransportError::InvalidSubject(subject.to_string()));
    }
    Ok(())
}
