//! Quote Source Port (Driven Port)
//!
//! Interface for fetching normalized quotes from the external price API.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::quote::{QuoteSample, TrackedSymbol};

/// Upper bound on a single fetch, including the response body.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Quote fetch error.
///
/// Any of these drops the current refresh cycle; the next scheduled trigger
/// is the retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The external call exceeded [`FETCH_TIMEOUT`].
    #[error("quote request timed out after {}s", FETCH_TIMEOUT.as_secs())]
    Timeout,

    /// Non-success status or a payload of the wrong shape.
    #[error("bad response from quote source: {message}")]
    BadResponse {
        /// Error details.
        message: String,
    },

    /// The request never produced a response.
    #[error("quote source unreachable: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// Called with an empty symbol list.
    #[error("no symbols requested")]
    NoSymbols,
}

impl FetchError {
    /// Metric label for this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::BadResponse { .. } => "bad_response",
            Self::Network { .. } => "network",
            Self::NoSymbols => "no_symbols",
        }
    }
}

/// Port for the external price source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSourcePort: Send + Sync {
    /// Fetch one sample per requested symbol.
    ///
    /// On success the result has exactly one sample per symbol, in request
    /// order. Partial results are never returned.
    async fn fetch(&self, symbols: &[TrackedSymbol]) -> Result<Vec<QuoteSample>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        assert_eq!(FetchError::Timeout.kind(), "timeout");
        assert_eq!(
            FetchError::BadResponse {
                message: String::new()
            }
            .kind(),
            "bad_response"
        );
        assert_eq!(FetchError::NoSymbols.kind(), "no_symbols");
    }

    #[test]
    fn timeout_message_mentions_bound() {
        assert_eq!(
            FetchError::Timeout.to_string(),
            "quote request timed out after 10s"
        );
    }
}
