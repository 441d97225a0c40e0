//! Quote Store Port (Driven Port)
//!
//! Interface for the append-only sample history.

use async_trait::async_trait;

use crate::domain::quote::{QuoteSample, TrackedSymbol};

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Could not reach the backing store.
    #[error("store connection failed: {0}")]
    Connection(String),

    /// A read or write failed.
    #[error("store query failed: {0}")]
    Query(String),

    /// A persisted row no longer forms a valid sample.
    #[error("corrupt stored sample: {0}")]
    Corrupt(String),
}

/// A persisted sample with its insertion sequence.
///
/// The sequence is strictly increasing per store and breaks ties between
/// samples sharing an `observed_at` timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredQuote {
    /// The sample as appended.
    pub sample: QuoteSample,
    /// Insertion sequence assigned by the store.
    pub sequence: u64,
}

/// Port for persisting and reading back samples.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteStorePort: Send + Sync {
    /// Append a sample and return its insertion sequence.
    ///
    /// Appending the same sample twice stores two records.
    async fn append(&self, sample: &QuoteSample) -> Result<u64, StoreError>;

    /// Up to `limit` most recent samples for `symbol`.
    ///
    /// Ordered by `observed_at` descending, then by insertion sequence
    /// descending.
    async fn recent(
        &self,
        symbol: &TrackedSymbol,
        limit: usize,
    ) -> Result<Vec<StoredQuote>, StoreError>;

    /// Release any held resources. Called once during shutdown.
    async fn close(&self);
}
