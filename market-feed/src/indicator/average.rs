use crate::candle::Candle;
use serde::{Deserialize, Serialize};

/// Simple moving average of closes, aligned by position.
pub fn sma(candles: &[Candle], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; candles.len()];
    }

    let mut out = Vec::with_capacity(candles.len());
    let mut sum = 0.0;
    for (index, candle) in candles.iter().enumerate() {
        sum += candle.close;
        if index >= window {
            sum -= candles[index - window].close;
        }
        out.push((index + 1 >= window).then(|| sum / window as f64));
    }
    out
}

/// One MACD observation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: Option<f64>,
    pub hist: Option<f64>,
}

const MACD_WARMUP: usize = 25;
const SIGNAL_SEED: usize = 26;

/// MACD(12, 26) with a 9-ish signal line.
///
/// EMAs are seeded with the first close. The MACD line is reported from index 25,
/// the signal line is seeded with the MACD value at index 26 and smoothed with
/// weight 0.2 afterwards; the histogram starts once the signal has history.
pub fn macd(candles: &[Candle]) -> Vec<Option<MacdPoint>> {
    let mut out = Vec::with_capacity(candles.len());
    let (mut ema12, mut ema26) = (0.0, 0.0);
    let mut signal: Option<f64> = None;

    for (index, candle) in candles.iter().enumerate() {
        if index == 0 {
            ema12 = candle.close;
            ema26 = candle.close;
        } else {
            ema12 = ema12 * 11.0 / 13.0 + candle.close * 2.0 / 13.0;
            ema26 = ema26 * 25.0 / 27.0 + candle.close * 2.0 / 27.0;
        }

        if index < MACD_WARMUP {
            out.push(None);
            continue;
        }

        let line = ema12 - ema26;
        let hist = match (index, signal) {
            (SIGNAL_SEED, _) => {
                signal = Some(line);
                None
            }
            (i, Some(prev)) if i > SIGNAL_SEED => {
                let next = prev * 0.8 + line * 0.2;
                signal = Some(next);
                Some(line - next)
            }
            _ => None,
        };

        out.push(Some(MacdPoint {
            macd: line,
            signal,
            hist,
        }));
    }

    out
}
