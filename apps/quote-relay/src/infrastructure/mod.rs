//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// In-process pub/sub broker.
pub mod broker;

/// CoinGecko quote source.
pub mod coingecko;

/// Configuration loading.
pub mod config;

/// Query and health HTTP surface.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// NATS protocol transport.
pub mod nats;

/// Sample history stores.
pub mod store;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
