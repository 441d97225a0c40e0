//! Update Event Codec
//!
//! JSON encoding of quote samples for the update subject.
//!
//! An event is either a single sample object or an array of sample objects:
//!
//! ```json
//! {"symbol":"bitcoin","price":64000.5,"marketCap":1.2e12,"change24h":-1.4,"observedAt":"2024-05-01T12:00:00Z"}
//! ```
//!
//! Decoding is all-or-nothing: if any entry is malformed or refers to an
//! untracked symbol, the whole event is rejected.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{InvalidSymbol, QuoteSample, SampleError, TrackedSet};

/// Update event decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// JSON parsing failed or a required field is missing.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is neither a JSON object nor a JSON array.
    #[error("invalid event format: {0}")]
    InvalidFormat(String),

    /// Batch event without entries.
    #[error("empty event batch")]
    EmptyBatch,

    /// Entry refers to a symbol outside the tracked set.
    #[error(transparent)]
    Symbol(#[from] InvalidSymbol),

    /// Entry failed sample validation.
    #[error("invalid sample: {0}")]
    Sample(#[from] SampleError),
}

/// Wire shape of a single sample.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSample {
    symbol: String,
    price: f64,
    market_cap: f64,
    #[serde(rename = "change24h", alias = "24hChange")]
    change_24h: f64,
    observed_at: DateTime<Utc>,
}

/// Encoder/decoder for update events, bound to the tracked set.
#[derive(Debug, Clone)]
pub struct UpdateEventCodec {
    tracked: TrackedSet,
}

impl UpdateEventCodec {
    /// Create a codec that accepts only symbols in `tracked`.
    #[must_use]
    pub const fn new(tracked: TrackedSet) -> Self {
        Self { tracked }
    }

    /// Encode one sample as a single-entry event.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, sample: &QuoteSample) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(sample)
    }

    /// Encode several samples as one batch event.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode_batch(&self, samples: &[QuoteSample]) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(samples)
    }

    /// Decode an event into its samples.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the payload is not a well-formed event.
    pub fn decode(&self, payload: &[u8]) -> Result<Vec<QuoteSample>, DecodeError> {
        let trimmed = payload.trim_ascii_start();

        let wire: Vec<WireSample> = match trimmed.first() {
            Some(b'[') => serde_json::from_slice(trimmed)?,
            Some(b'{') => vec![serde_json::from_slice(trimmed)?],
            _ => {
                let preview = String::from_utf8_lossy(&trimmed[..trimmed.len().min(50)]);
                return Err(DecodeError::InvalidFormat(format!(
                    "expected JSON object or array, got: {preview}..."
                )));
            }
        };

        if wire.is_empty() {
            return Err(DecodeError::EmptyBatch);
        }

        wire.into_iter()
            .map(|w| -> Result<QuoteSample, DecodeError> {
                let symbol = self.tracked.resolve(&w.symbol)?;
                Ok(QuoteSample::new(
                    symbol,
                    w.price,
                    w.market_cap,
                    w.change_24h,
                    w.observed_at,
                )?)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn codec() -> UpdateEventCodec {
        UpdateEventCodec::new(TrackedSet::default())
    }

    fn sample(symbol: &str, price: f64) -> QuoteSample {
        let symbol = TrackedSet::default().resolve(symbol).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        QuoteSample::new(symbol, price, 1.0e12, -1.5, at).unwrap()
    }

    #[test]
    fn encodes_canonical_field_names() {
        let bytes = codec().encode(&sample("bitcoin", 64000.5)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["symbol"], "bitcoin");
        assert_eq!(value["price"], 64000.5);
        assert_eq!(value["marketCap"], 1.0e12);
        assert_eq!(value["change24h"], -1.5);
        assert_eq!(value["observedAt"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn decodes_single_event() {
        let original = sample("ethereum", 3100.0);
        let bytes = codec().encode(&original).unwrap();
        assert_eq!(codec().decode(&bytes).unwrap(), vec![original]);
    }

    #[test]
    fn decodes_batch_in_order() {
        let batch = vec![sample("bitcoin", 1.0), sample("ethereum", 2.0)];
        let bytes = codec().encode_batch(&batch).unwrap();
        assert_eq!(codec().decode(&bytes).unwrap(), batch);
    }

    #[test]
    fn accepts_legacy_change_field() {
        let payload = br#"{"symbol":"bitcoin","price":1,"marketCap":2,"24hChange":3,"observedAt":"2024-05-01T12:00:00Z"}"#;
        let samples = codec().decode(payload).unwrap();
        assert!((samples[0].change_24h() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(
            codec().decode(b"not json"),
            Err(DecodeError::InvalidFormat(_))
        ));
    }

    #[test]
    fn rejects_missing_symbol() {
        let payload = br#"{"price":1,"marketCap":2,"change24h":3,"observedAt":"2024-05-01T12:00:00Z"}"#;
        assert!(matches!(codec().decode(payload), Err(DecodeError::Json(_))));
    }

    #[test]
    fn rejects_untracked_symbol() {
        let payload = br#"{"symbol":"dogecoin","price":1,"marketCap":2,"change24h":3,"observedAt":"2024-05-01T12:00:00Z"}"#;
        assert!(matches!(codec().decode(payload), Err(DecodeError::Symbol(_))));
    }

    #[test]
    fn rejects_whole_batch_on_one_bad_entry() {
        let payload = br#"[
            {"symbol":"bitcoin","price":1,"marketCap":2,"change24h":3,"observedAt":"2024-05-01T12:00:00Z"},
            {"symbol":"ethereum","price":-5,"marketCap":2,"change24h":3,"observedAt":"2024-05-01T12:00:00Z"}
        ]"#;
        assert!(matches!(
            codec().decode(payload),
            Err(DecodeError::Sample(SampleError::NegativePrice(_)))
        ));
    }

    #[test]
    fn rejects_empty_batch() {
        assert!(matches!(codec().decode(b"[]"), Err(DecodeError::EmptyBatch)));
    }
}
