//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (quote source, store, transport).
pub mod ports;

/// Application services: scheduler, producer, consumer group and statistics.
pub mod services;
