//! Quote Domain Types
//!
//! Tracked symbols and normalized quote samples.
//!
//! # Design
//!
//! A [`TrackedSymbol`] can only be obtained by resolving a raw identifier
//! against the configured [`TrackedSet`], so every sample that reaches the
//! store refers to a member of the closed set the process was started with.

mod event;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

pub use event::{DecodeError, UpdateEventCodec};

/// Symbols tracked when no explicit set is configured.
pub const DEFAULT_TRACKED_SYMBOLS: &[&str] = &["bitcoin", "ethereum", "matic-network"];

// =============================================================================
// Tracked Symbols
// =============================================================================

/// Identifier of an entity the relay watches (e.g. `bitcoin`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackedSymbol(Arc<str>);

impl TrackedSymbol {
    fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackedSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TrackedSymbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for TrackedSymbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Raw identifier is not a member of the tracked set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid symbol '{symbol}', supported symbols: {supported}")]
pub struct InvalidSymbol {
    /// The rejected identifier.
    pub symbol: String,
    /// Comma-separated list of tracked symbols.
    pub supported: String,
}

/// Tracked set construction error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackedSetError {
    /// No symbols were supplied.
    #[error("tracked symbol set cannot be empty")]
    Empty,
}

/// The closed set of symbols this process tracks.
///
/// Order is preserved from configuration and duplicates are collapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedSet {
    symbols: Arc<[TrackedSymbol]>,
}

impl TrackedSet {
    /// Build a tracked set from raw identifiers.
    ///
    /// Identifiers are trimmed; blank entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TrackedSetError::Empty`] if no identifier remains.
    pub fn new<I, S>(ids: I) -> Result<Self, TrackedSetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut symbols: Vec<TrackedSymbol> = Vec::new();
        for id in ids {
            let id = id.as_ref().trim();
            if id.is_empty() || symbols.iter().any(|s| s.as_str() == id) {
                continue;
            }
            symbols.push(TrackedSymbol::new(id));
        }

        if symbols.is_empty() {
            return Err(TrackedSetError::Empty);
        }

        Ok(Self {
            symbols: symbols.into(),
        })
    }

    /// Resolve a raw identifier to a tracked symbol.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSymbol`] if the identifier is not tracked.
    pub fn resolve(&self, raw: &str) -> Result<TrackedSymbol, InvalidSymbol> {
        self.symbols
            .iter()
            .find(|s| s.as_str() == raw)
            .cloned()
            .ok_or_else(|| InvalidSymbol {
                symbol: raw.to_string(),
                supported: self.to_string(),
            })
    }

    /// Check whether a raw identifier is tracked.
    #[must_use]
    pub fn contains(&self, raw: &str) -> bool {
        self.symbols.iter().any(|s| s.as_str() == raw)
    }

    /// All tracked symbols in configuration order.
    #[must_use]
    pub fn symbols(&self) -> &[TrackedSymbol] {
        &self.symbols
    }

    /// Number of tracked symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always `false`; a tracked set is never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Default for TrackedSet {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_TRACKED_SYMBOLS
                .iter()
                .map(|id| TrackedSymbol::new(id))
                .collect(),
        }
    }
}

impl fmt::Display for TrackedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, symbol) in self.symbols.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(symbol.as_str())?;
        }
        Ok(())
    }
}

// =============================================================================
// Quote Sample
// =============================================================================

/// Sample construction error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SampleError {
    /// Price below zero.
    #[error("price cannot be negative: {0}")]
    NegativePrice(f64),

    /// A numeric field is NaN or infinite.
    #[error("field '{0}' must be a finite number")]
    NonFinite(&'static str),
}

/// One normalized observation of a tracked symbol.
///
/// Serializes to the update event wire shape:
/// `{"symbol","price","marketCap","change24h","observedAt"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSample {
    symbol: TrackedSymbol,
    price: f64,
    market_cap: f64,
    #[serde(rename = "change24h")]
    change_24h: f64,
    observed_at: DateTime<Utc>,
}

impl QuoteSample {
    /// Create a validated sample.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError`] if a number is not finite or the price is negative.
    pub fn new(
        symbol: TrackedSymbol,
        price: f64,
        market_cap: f64,
        change_24h: f64,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, SampleError> {
        if !price.is_finite() {
            return Err(SampleError::NonFinite("price"));
        }
        if price < 0.0 {
            return Err(SampleError::NegativePrice(price));
        }
        if !market_cap.is_finite() {
            return Err(SampleError::NonFinite("marketCap"));
        }
        if !change_24h.is_finite() {
            return Err(SampleError::NonFinite("change24h"));
        }

        Ok(Self {
            symbol,
            price,
            market_cap,
            change_24h,
            observed_at,
        })
    }

    /// The tracked symbol.
    #[must_use]
    pub const fn symbol(&self) -> &TrackedSymbol {
        &self.symbol
    }

    /// Price in the quote currency.
    #[must_use]
    pub const fn price(&self) -> f64 {
        self.price
    }

    /// Market capitalization.
    #[must_use]
    pub const fn market_cap(&self) -> f64 {
        self.market_cap
    }

    /// 24 hour price change percentage.
    #[must_use]
    pub const fn change_24h(&self) -> f64 {
        self.change_24h
    }

    /// When the sample was observed.
    #[must_use]
    pub const fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }
}

// =============================================================================
// Tests
// =============================================================================
