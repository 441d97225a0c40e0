//! Domain Layer - Core quote types and statistics.
//!
//! This layer contains the core domain types for the quote pipeline
//! with no I/O. All types here are pure Rust with serialization support.

/// Tracked symbols, quote samples and the update event wire format.
pub mod quote;

/// Rolling statistics over persisted samples.
pub mod statistics;
