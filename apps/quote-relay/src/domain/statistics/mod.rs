//! Rolling Statistics
//!
//! Pure functions over a window of persisted prices.
//!
//! The deviation is always computed with the batch formula over the whole
//! window, never incrementally, so the result does not depend on how the
//! window was filled:
//!
//! ```text
//! mean     = sum(p) / N
//! variance = sum((p - mean)^2) / N
//! stddev   = sqrt(variance)
//! ```

use serde::Serialize;

use super::quote::QuoteSample;

/// Number of samples the deviation is computed over by default.
pub const DEFAULT_DEVIATION_WINDOW: usize = 100;

/// Latest-value projection of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestQuote {
    /// Price in the quote currency.
    pub price: f64,
    /// Market capitalization.
    pub market_cap: f64,
    /// 24 hour price change percentage.
    #[serde(rename = "change24h")]
    pub change_24h: f64,
}

impl From<&QuoteSample> for LatestQuote {
    fn from(sample: &QuoteSample) -> Self {
        Self {
            price: sample.price(),
            market_cap: sample.market_cap(),
            change_24h: sample.change_24h(),
        }
    }
}

/// Population standard deviation (divides by N).
///
/// Returns `None` for an empty slice and `0.0` for a single value.
#[must_use]
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;

    Some(variance.sqrt())
}

/// Round half away from zero to two decimal places.
#[must_use]
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rounded population standard deviation of a price window.
#[must_use]
pub fn price_deviation(prices: &[f64]) -> Option<f64> {
    population_std_dev(prices).map(round_to_cents)
}
