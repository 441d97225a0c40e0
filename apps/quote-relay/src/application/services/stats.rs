//! Statistics Service
//!
//! Read-side queries over the sample history: latest value and rolling
//! price deviation for a tracked symbol.

use std::sync::Arc;

use crate::application::ports::{QuoteStorePort, StoreError};
use crate::domain::quote::{InvalidSymbol, TrackedSet};
use crate::domain::statistics::{self, LatestQuote};

/// Statistics query error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    /// Symbol is missing or not tracked.
    #[error(transparent)]
    InvalidSymbol(#[from] InvalidSymbol),

    /// No samples stored for the symbol.
    #[error("no data found for {symbol}")]
    NotFound {
        /// The queried symbol.
        symbol: String,
    },

    /// Window size of zero.
    #[error("window must be at least 1")]
    InvalidWindow,

    /// Store read failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Latest-value and deviation queries.
#[derive(Clone)]
pub struct StatisticsService {
    store: Arc<dyn QuoteStorePort>,
    tracked: TrackedSet,
}

impl StatisticsService {
    /// Create a service over `store`, accepting only `tracked` symbols.
    #[must_use]
    pub fn new(store: Arc<dyn QuoteStorePort>, tracked: TrackedSet) -> Self {
        Self { store, tracked }
    }

    /// Symbols accepted by the queries.
    #[must_use]
    pub const fn tracked(&self) -> &TrackedSet {
        &self.tracked
    }

    /// Most recent sample for `symbol`.
    ///
    /// Samples sharing a timestamp resolve to the later insert.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError`] if the symbol is not tracked, nothing is stored
    /// yet, or the store read fails.
    pub async fn latest(&self, symbol: &str) -> Result<LatestQuote, StatsError> {
        let symbol = self.tracked.resolve(symbol)?;
        let recent = self.store.recent(&symbol, 1).await?;

        recent
            .first()
            .map(|stored| LatestQuote::from(&stored.sample))
            .ok_or_else(|| StatsError::NotFound {
                symbol: symbol.to_string(),
            })
    }

    /// Population standard deviation of the most recent `window` prices,
    /// rounded to two decimals.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError`] if the symbol is not tracked, `window` is zero,
    /// nothing is stored yet, or the store read fails.
    pub async fn deviation(&self, symbol: &str, window: usize) -> Result<f64, StatsError> {
        let symbol = self.tracked.resolve(symbol)?;
        if window == 0 {
            return Err(StatsError::InvalidWindow);
        }

        let prices: Vec<f64> = self
            .store
            .recent(&symbol, window)
            .await?
            .iter()
            .map(|stored| stored.sample.price())
            .collect();

        statistics::price_deviation(&prices).ok_or_else(|| StatsError::NotFound {
            symbol: symbol.to_string(),
        })
    }
}

impl std::fmt::Debug for StatisticsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsService")
            .field("tracked", &self.tracked)
            .finish_non_exhaustive()
    }
}
