use crate::candle::Candle;
use serde::{Deserialize, Serialize};

/// Moving averages and MACD.
pub mod average;

/// Bollinger band computation.
pub mod band;

pub use average::{MacdPoint, macd, sma};
pub use band::{
    Band, DEFAULT_BAND_MULTIPLIER, DEFAULT_BAND_PERIOD, compute_band, compute_default_band,
};

/// Index-aligned indicator series for one candle sequence.
///
/// Every series has the same length as the candles it was computed from; entries
/// before an indicator's warm-up are `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct IndicatorSnapshot {
    pub bands: Vec<Option<Band>>,
    pub ma5: Vec<Option<f64>>,
    pub ma10: Vec<Option<f64>>,
    pub ma20: Vec<Option<f64>>,
    pub macd: Vec<Option<MacdPoint>>,
}

impl IndicatorSnapshot {
    pub fn compute(candles: &[Candle]) -> Self {
        Self {
            bands: compute_default_band(candles),
            ma5: sma(candles, 5),
            ma10: sma(candles, 10),
            ma20: sma(candles, 20),
            macd: macd(candles),
        }
    }

    /// Number of candle positions covered by this snapshot.
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Most recent band, if the last position has one.
    pub fn latest_band(&self) -> Option<Band> {
        self.bands.last().copied().flatten()
    }
}
