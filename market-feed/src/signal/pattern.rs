//! Single and two-candle shape predicates.
//!
//! Every predicate returns `false` for zero-range candles (`high == low`).

use crate::candle::Candle;

/// Default doji body/open ratio threshold (0.1%).
pub const DEFAULT_DOJI_THRESHOLD: f64 = 0.001;

/// Small body relative to the open price, with wicks at least twice the body.
///
/// The body ratio comparison is strict: a ratio exactly equal to `threshold` is
/// not a doji.
pub fn is_doji_pattern(candle: &Candle, threshold: f64) -> bool {
    if candle.high == candle.low {
        return false;
    }

    let body = candle.body();
    let range = candle.range();
    range > 0.0 && body / candle.open < threshold && range > body * 2.0
}

/// Long lower shadow (≥ 2x body) with a short upper shadow (≤ 0.3x body).
pub fn is_hammer(candle: &Candle) -> bool {
    if candle.high == candle.low {
        return false;
    }

    let body = candle.body();
    candle.range() > 0.0
        && candle.lower_shadow() >= body * 2.0
        && candle.upper_shadow() <= body * 0.3
}

/// Same shape as a hammer; the bearish reading comes from where it prints.
pub fn is_hanging_man(candle: &Candle) -> bool {
    is_hammer(candle)
}

/// Long upper shadow making up at least half the range.
pub fn is_top_pin(candle: &Candle) -> bool {
    if candle.high == candle.low {
        return false;
    }

    let body = candle.body();
    let range = candle.range();
    let upper = candle.upper_shadow();
    range > 0.0 && upper >= body * 2.0 && candle.lower_shadow() <= body * 0.3 && upper >= range * 0.5
}

/// Stricter [`is_top_pin`]: upper shadow ≥ 3x body and ≥ 60% of the range.
pub fn is_long_top_pin(candle: &Candle) -> bool {
    if candle.high == candle.low {
        return false;
    }

    let body = candle.body();
    let range = candle.range();
    let upper = candle.upper_shadow();
    range > 0.0 && upper >= body * 3.0 && candle.lower_shadow() <= body * 0.2 && upper >= range * 0.6
}

/// Direction of an engulfing pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engulfing {
    Bullish,
    Bearish,
}

/// Classify `curr` as engulfing `prev`, if its body fully contains the previous
/// body in the opposite direction.
pub fn engulfing(prev: &Candle, curr: &Candle) -> Option<Engulfing> {
    if prev.high == prev.low || curr.high == curr.low {
        return None;
    }
    if curr.body() <= prev.body() {
        return None;
    }

    if prev.is_bearish() && curr.is_bullish() && curr.open < prev.close && curr.close > prev.open {
        Some(Engulfing::Bullish)
    } else if prev.is_bullish()
        && curr.is_bearish()
        && curr.open > prev.close
        && curr.close < prev.open
    {
        Some(Engulfing::Bearish)
    } else {
        None
    }
}

/// Whether the `count` candles ending at `index` are all hammers.
pub fn is_consecutive_hammers(candles: &[Candle], index: usize, count: usize) -> bool {
    if count == 0 || index + 1 < count || index >= candles.len() {
        return false;
    }

    candles[index + 1 - count..=index].iter().all(is_hammer)
}
