use crate::candle::Candle;
use serde::{Deserialize, Serialize};

/// Default Bollinger window length.
pub const DEFAULT_BAND_PERIOD: usize = 20;

/// Default standard deviation multiplier.
pub const DEFAULT_BAND_MULTIPLIER: f64 = 2.0;

/// Statistical envelope (mean ± k·stddev) over a trailing window of closes.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Band {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
}

impl Band {
    /// Distance between the upper and lower envelope.
    pub fn height(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Compute a Bollinger band for every candle, aligned by position.
///
/// Indices before the first full window (`i < period - 1`) are `None`. Variance is
/// the population variance of the trailing `period` closes.
pub fn compute_band(candles: &[Candle], period: usize, multiplier: f64) -> Vec<Option<Band>> {
    if period == 0 {
        return vec![None; candles.len()];
    }

    (0..candles.len())
        .map(|index| {
            if index + 1 < period {
                return None;
            }

            let window = &candles[index + 1 - period..=index];
            let n = period as f64;
            let mean = window.iter().map(|c| c.close).sum::<f64>() / n;
            let variance = window
                .iter()
                .map(|c| {
                    let diff = c.close - mean;
                    diff * diff
                })
                .sum::<f64>()
                / n;
            let std_dev = variance.sqrt();

            Some(Band {
                middle: mean,
                upper: mean + multiplier * std_dev,
                lower: mean - multiplier * std_dev,
            })
        })
        .collect()
}

/// [`compute_band`] with the default 20 period, 2 stddev parameters.
pub fn compute_default_band(candles: &[Candle]) -> Vec<Option<Band>> {
    compute_band(candles, DEFAULT_BAND_PERIOD, DEFAULT_BAND_MULTIPLIER)
}
