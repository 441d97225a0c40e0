//! In-memory sample history.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{QuoteStorePort, StoreError, StoredQuote};
use crate::domain::quote::{QuoteSample, TrackedSymbol};

#[derive(Debug, Default)]
struct History {
    /// Per-symbol samples, ascending by `(observed_at, sequence)`.
    by_symbol: HashMap<TrackedSymbol, Vec<StoredQuote>>,
    last_sequence: u64,
}

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryQuoteStore {
    history: RwLock<History>,
}

impl MemoryQuoteStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.history.read().by_symbol.values().map(Vec::len).sum()
    }

    /// Whether nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl QuoteStorePort for MemoryQuoteStore {
    async fn append(&self, sample: &QuoteSample) -> Result<u64, StoreError> {
        let mut history = self.history.write();
        history.last_sequence += 1;
        let sequence = history.last_sequence;

        let samples = history
            .by_symbol
            .entry(sample.symbol().clone())
            .or_default();

        // Everything at or before this timestamp sorts first; equal
        // timestamps keep insertion order.
        let at = sample.observed_at();
        let index = samples.partition_point(|s| s.sample.observed_at() <= at);
        samples.insert(
            index,
            StoredQuote {
                sample: sample.clone(),
                sequence,
            },
        );

        Ok(sequence)
    }

    async fn recent(
        &self,
        symbol: &TrackedSymbol,
        limit: usize,
    ) -> Result<Vec<StoredQuote>, StoreError> {
        let history = self.history.read();
        Ok(history
            .by_symbol
            .get(symbol)
            .map(|samples| samples.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn close(&self) {
        tracing::debug!(samples = self.len(), "In-memory quote store closed");
    }
}
