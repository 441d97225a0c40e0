#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Quote Relay - Scheduled Quote Refresh and Distribution
//!
//! Periodically fetches market quotes for a fixed set of symbols, publishes
//! one update event per symbol over a pub/sub transport, persists the events
//! through a load-balanced consumer group, and serves latest-value and
//! rolling-deviation queries over HTTP.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core quote types and math
//!   - `quote`: Tracked symbols, samples, update event codec
//!   - `statistics`: Latest value projection and population stddev
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Quote source, quote store and transport interfaces
//!   - `services`: Scheduler, producer, consumer group, statistics
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `nats`: NATS text protocol client with reconnect and keep-alive
//!   - `broker`: In-process broker with the same queue-group semantics
//!   - `coingecko`: HTTP quote source
//!   - `store`: In-memory and `PostgreSQL` sample history
//!   - `http`: Query, refresh, health and metrics endpoints
//!   - `config`, `telemetry`, `metrics`: Ambient concerns
//!
//! # Data Flow
//!
//! ```text
//! Scheduler ──► Producer ──► fetch ──► publish quotes.update
//!                                            │
//!                        ┌───────────────────┴───────────────────┐
//!                        ▼  queue group: quote-consumers          ▼
//!                  Consumer 1 ──► store ◄── Consumer N
//!                                  │
//!                                  ▼
//!                         StatisticsService ──► HTTP
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core quote types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::quote::{
    DecodeError, InvalidSymbol, QuoteSample, SampleError, TrackedSet, TrackedSetError,
    TrackedSymbol, UpdateEventCodec,
};
pub use domain::statistics::{DEFAULT_DEVIATION_WINDOW, LatestQuote};

// Ports
pub use application::ports::{
    CloseReason, ConnectionState, FetchError, QuoteSourcePort, QuoteStorePort, StoreError,
    StoredQuote, Subscription, TransportError, TransportPort,
};

// Services
pub use application::services::{
    ConsumerGroup, ConsumerStats, CycleReport, Producer, Scheduler, StatisticsService, StatsError,
    Trigger, TriggerHandle,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, RelayConfig, RelayEnv, RelayRole};

// Adapters (for integration tests)
pub use infrastructure::broker::InMemoryBroker;
pub use infrastructure::coingecko::CoinGeckoClient;
pub use infrastructure::http::{HttpServer, HttpServerError, HttpState, router};
pub use infrastructure::nats::{NatsClient, NatsOptions};
pub use infrastructure::store::{MemoryQuoteStore, PostgresQuoteStore, connect_store};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
