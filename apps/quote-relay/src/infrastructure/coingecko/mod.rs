//! CoinGecko Quote Source
//!
//! [`QuoteSourcePort`] adapter for the `/coins/markets` endpoint.
//!
//! # Request
//!
//! ```text
//! GET {base}/coins/markets?vs_currency=usd&ids=bitcoin,ethereum
//! ```
//!
//! # Normalization
//!
//! Records may use the vendor field names (`current_price`, `market_cap`,
//! `price_change_percentage_24h`) or the normalized ones (`price`,
//! `marketCap`, `change24h`). A missing 24h change becomes `0.0`; a missing
//! price or market cap fails the whole fetch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::application::ports::{FETCH_TIMEOUT, FetchError, QuoteSourcePort};
use crate::domain::quote::{QuoteSample, TrackedSymbol};

/// Public CoinGecko API.
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Quote currency requested from the API.
const VS_CURRENCY: &str = "usd";

/// One record of the markets response.
#[derive(Debug, Clone, Deserialize)]
struct MarketRecord {
    id: String,
    #[serde(alias = "price")]
    current_price: Option<f64>,
    #[serde(alias = "marketCap")]
    market_cap: Option<f64>,
    #[serde(alias = "change24h")]
    price_change_percentage_24h: Option<f64>,
}

/// Build one sample per requested symbol, in request order.
fn normalize(
    symbols: &[TrackedSymbol],
    records: &[MarketRecord],
    observed_at: DateTime<Utc>,
) -> Result<Vec<QuoteSample>, FetchError> {
    symbols
        .iter()
        .map(|symbol| {
            let record = records
                .iter()
                .find(|r| r.id == symbol.as_str())
                .ok_or_else(|| bad_response(format!("no record for '{symbol}'")))?;

            let price = record
                .current_price
                .ok_or_else(|| bad_response(format!("missing price for '{symbol}'")))?;
            let market_cap = record
                .market_cap
                .ok_or_else(|| bad_response(format!("missing market cap for '{symbol}'")))?;
            let change_24h = record.price_change_percentage_24h.unwrap_or(0.0);

            QuoteSample::new(symbol.clone(), price, market_cap, change_24h, observed_at)
                .map_err(|e| bad_response(format!("invalid record for '{symbol}': {e}")))
        })
        .collect()
}

fn bad_response(message: String) -> FetchError {
    FetchError::BadResponse { message }
}

fn map_reqwest_error(error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if error.is_decode() {
        bad_response(format!("malformed body: {error}"))
    } else {
        FetchError::Network {
            message: error.to_string(),
        }
    }
}

/// HTTP client for the CoinGecko markets API.
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
}

impl CoinGeckoClient {
    /// Create a client for `base_url` with the fixed fetch timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("quote-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl QuoteSourcePort for CoinGeckoClient {
    async fn fetch(&self, symbols: &[TrackedSymbol]) -> Result<Vec<QuoteSample>, FetchError> {
        if symbols.is_empty() {
            return Err(FetchError::NoSymbols);
        }

        let ids = symbols
            .iter()
            .map(TrackedSymbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/coins/markets", self.base_url);

        tracing::debug!(%url, ids = %ids, "Fetching quotes");

        let response = self
            .client
            .get(&url)
            .query(&[("vs_currency", VS_CURRENCY), ("ids", ids.as_str())])
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            return Err(bad_response(format!("status {status}: {preview}")));
        }

        let records: Vec<MarketRecord> =
            response.json().await.map_err(|e| map_reqwest_error(&e))?;
        let samples = normalize(symbols, &records, Utc::now())?;

        tracing::debug!(count = samples.len(), "Fetched quotes");
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::TrackedSet;

    fn records(json: &str) -> Vec<MarketRecord> {
        serde_json::from_str(json).unwrap()
    }

    fn symbols(ids: &[&str]) -> Vec<TrackedSymbol> {
        let set = TrackedSet::default();
        ids.iter().map(|id| set.resolve(id).unwrap()).collect()
    }

    #[test]
    fn normalizes_vendor_fields_in_request_order() {
        let records = records(
            r#"[
                {"id":"ethereum","symbol":"eth","current_price":3000.5,"market_cap":3.6e11,"price_change_percentage_24h":-2.1},
                {"id":"bitcoin","symbol":"btc","current_price":64000,"market_cap":1.2e12,"price_change_percentage_24h":1.5}
            ]"#,
        );
        let now = Utc::now();
        let samples = normalize(&symbols(&["bitcoin", "ethereum"]), &records, now).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].symbol().as_str(), "bitcoin");
        assert!((samples[0].price() - 64000.0).abs() < f64::EPSILON);
        assert_eq!(samples[1].symbol().as_str(), "ethereum");
        assert!((samples[1].change_24h() + 2.1).abs() < f64::EPSILON);
        assert_eq!(samples[1].observed_at(), now);
    }

    #[test]
    fn accepts_normalized_field_names() {
        let records =
            records(r#"[{"id":"bitcoin","price":1.5,"marketCap":20.0,"change24h":0.25}]"#);
        let samples = normalize(&symbols(&["bitcoin"]), &records, Utc::now()).unwrap();
        assert!((samples[0].market_cap() - 20.0).abs() < f64::EPSILON);
        assert!((samples[0].change_24h() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn null_change_becomes_zero() {
        let records = records(
            r#"[{"id":"bitcoin","current_price":1.0,"market_cap":2.0,"price_change_percentage_24h":null}]"#,
        );
        let samples = normalize(&symbols(&["bitcoin"]), &records, Utc::now()).unwrap();
        assert!(samples[0].change_24h().abs() < f64::EPSILON);
    }

    #[test]
    fn null_price_is_bad_response() {
        let records = records(r#"[{"id":"bitcoin","current_price":null,"market_cap":2.0}]"#);
        assert!(matches!(
            normalize(&symbols(&["bitcoin"]), &records, Utc::now()),
            Err(FetchError::BadResponse { .. })
        ));
    }

    #[test]
    fn missing_symbol_is_bad_response() {
        let records = records(r#"[{"id":"bitcoin","current_price":1.0,"market_cap":2.0}]"#);
        let err = normalize(&symbols(&["bitcoin", "ethereum"]), &records, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            FetchError::BadResponse {
                message: "no record for 'ethereum'".into()
            }
        );
    }

    #[test]
    fn negative_price_is_bad_response() {
        let records = records(r#"[{"id":"bitcoin","current_price":-1.0,"market_cap":2.0}]"#);
        assert!(matches!(
            normalize(&symbols(&["bitcoin"]), &records, Utc::now()),
            Err(FetchError::BadResponse { .. })
        ));
    }

    #[test]
    fn trims_trailing_slash() {
        let client = CoinGeckoClient::new("http://localhost:9999/api/v3/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:9999/api/v3");
    }

    #[tokio::test]
    async fn empty_symbols_rejected_without_request() {
        let client = CoinGeckoClient::new("http://127.0.0.1:1").unwrap();
        assert_eq!(client.fetch(&[]).await, Err(FetchError::NoSymbols));
    }
}
