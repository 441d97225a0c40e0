//! NATS Transport Adapter
//!
//! Client for the NATS text protocol, built directly on tokio.
//!
//! # Components
//!
//! - [`codec`]: Frame encoding/decoding for protocol operations
//! - [`heartbeat`]: Client-side `PING` and stale connection detection
//! - [`reconnect`]: Fixed-delay reconnection policy
//! - [`client`]: The [`NatsClient`] transport handle and its connection task

pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod reconnect;

pub use client::{NatsClient, NatsError, NatsOptions};
pub use heartbeat::HeartbeatConfig;
pub use reconnect::ReconnectConfig;
