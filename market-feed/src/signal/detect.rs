use super::{
    Alert, AlertKind,
    pattern::{
        DEFAULT_DOJI_THRESHOLD, Engulfing, engulfing, is_consecutive_hammers, is_doji_pattern,
        is_hammer, is_hanging_man, is_long_top_pin,
    },
};
use crate::{
    candle::Candle,
    indicator::{Band, compute_default_band},
};
use itertools::Itertools;

/// Default relative tolerance above the lower band for doji alerts (1%).
pub const DEFAULT_DOJI_TOLERANCE: f64 = 0.01;

/// Fraction of the band height counted as "at the band".
const BAND_PROXIMITY_RATIO: f64 = 0.1;

const STRONG_GROUP_WINDOWS: std::ops::RangeInclusive<usize> = 3..=5;
const STRONG_GROUP_MIN_PATTERNS: usize = 2;

fn near_lower(band: &Band, low: f64) -> bool {
    let diff = low - band.lower;
    diff >= 0.0 && diff <= band.height() * BAND_PROXIMITY_RATIO
}

fn near_upper(band: &Band, high: f64) -> bool {
    let diff = band.upper - high;
    diff >= 0.0 && diff <= band.height() * BAND_PROXIMITY_RATIO
}

/// Iterate `(index, candle, band)` for every position that has a band.
fn banded<'a>(
    candles: &'a [Candle],
    bands: &'a [Option<Band>],
) -> impl Iterator<Item = (usize, &'a Candle, Band)> + 'a {
    candles
        .iter()
        .zip(bands)
        .enumerate()
        .filter_map(|(index, (candle, band))| band.map(|band| (index, candle, band)))
}

/// Doji candles whose low or close sits within `tolerance` above the lower band.
///
/// Alerts are emitted in ascending index order. Positions without a band are
/// skipped.
pub fn detect_lower_band_doji(
    candles: &[Candle],
    bands: &[Option<Band>],
    tolerance: f64,
) -> Vec<Alert> {
    banded(candles, bands)
        .filter(|(_, candle, band)| {
            let ceiling = band.lower * (1.0 + tolerance);
            is_doji_pattern(candle, DEFAULT_DOJI_THRESHOLD)
                && (candle.low <= ceiling || candle.close <= ceiling)
        })
        .map(|(index, candle, band)| Alert {
            index,
            time: candle.time,
            price: candle.low,
            close: candle.close,
            lower_band: Some(band.lower),
            upper_band: None,
            kind: AlertKind::BollingerDojiBottom,
            strength: Some(0.8),
        })
        .collect()
}

pub fn detect_lower_band_hammer(candles: &[Candle], bands: &[Option<Band>]) -> Vec<Alert> {
    banded(candles, bands)
        .filter(|(_, candle, band)| is_hammer(candle) && near_lower(band, candle.low))
        .map(|(index, candle, band)| Alert {
            index,
            time: candle.time,
            price: candle.low,
            close: candle.close,
            lower_band: Some(band.lower),
            upper_band: None,
            kind: AlertKind::BollingerHammerBottom,
            strength: Some(0.85),
        })
        .collect()
}

/// Two hammers in a row ending at the lower band.
pub fn detect_consecutive_hammers(candles: &[Candle], bands: &[Option<Band>]) -> Vec<Alert> {
    banded(candles, bands)
        .filter(|(index, candle, band)| {
            is_consecutive_hammers(candles, *index, 2) && near_lower(band, candle.low)
        })
        .map(|(index, candle, band)| Alert {
            index,
            time: candle.time,
            price: candle.low,
            close: candle.close,
            lower_band: Some(band.lower),
            upper_band: None,
            kind: AlertKind::BollingerConsecutiveHammers,
            strength: Some(0.9),
        })
        .collect()
}

pub fn detect_upper_band_hanging_man(candles: &[Candle], bands: &[Option<Band>]) -> Vec<Alert> {
    banded(candles, bands)
        .filter(|(_, candle, band)| is_hanging_man(candle) && near_upper(band, candle.high))
        .map(|(index, candle, band)| Alert {
            index,
            time: candle.time,
            price: candle.high,
            close: candle.close,
            lower_band: None,
            upper_band: Some(band.upper),
            kind: AlertKind::BollingerHangingManTop,
            strength: Some(0.75),
        })
        .collect()
}

/// Bullish engulfing touching the lower band, bearish engulfing touching the
/// upper band. Either candle of the pair may be the one touching.
pub fn detect_band_engulfing(candles: &[Candle], bands: &[Option<Band>]) -> Vec<Alert> {
    candles
        .iter()
        .zip(bands)
        .enumerate()
        .tuple_windows()
        .filter_map(|((_, (prev, _)), (index, (curr, band)))| {
            let band = (*band)?;
            match engulfing(prev, curr)? {
                Engulfing::Bullish if near_lower(&band, curr.low) || near_lower(&band, prev.low) => {
                    Some(Alert {
                        index,
                        time: curr.time,
                        price: curr.low,
                        close: curr.close,
                        lower_band: Some(band.lower),
                        upper_band: None,
                        kind: AlertKind::BollingerBullishEngulfing,
                        strength: Some(0.88),
                    })
                }
                Engulfing::Bearish
                    if near_upper(&band, curr.high) || near_upper(&band, prev.high) =>
                {
                    Some(Alert {
                        index,
                        time: curr.time,
                        price: curr.high,
                        close: curr.close,
                        lower_band: None,
                        upper_band: Some(band.upper),
                        kind: AlertKind::BollingerBearishEngulfing,
                        strength: Some(0.88),
                    })
                }
                _ => None,
            }
        })
        .collect()
}

/// Clusters of at least two hammers or long top pins inside a 3 to 5 candle
/// window ending at a banded position. The smallest qualifying window wins.
pub fn detect_strong_pattern_groups(candles: &[Candle], bands: &[Option<Band>]) -> Vec<Alert> {
    banded(candles, bands)
        .filter_map(|(index, candle, band)| {
            STRONG_GROUP_WINDOWS
                .filter(|window| index + 1 >= *window)
                .find_map(|window| {
                    let (hammers, pins) = candles[index + 1 - window..=index].iter().fold(
                        (0usize, 0usize),
                        |(hammers, pins), c| {
                            if is_hammer(c) {
                                (hammers + 1, pins)
                            } else if is_long_top_pin(c) {
                                (hammers, pins + 1)
                            } else {
                                (hammers, pins)
                            }
                        },
                    );
                    strong_group(hammers, pins, candle)
                })
                .map(|(kind, strength, price)| Alert {
                    index,
                    time: candle.time,
                    price,
                    close: candle.close,
                    lower_band: Some(band.lower),
                    upper_band: Some(band.upper),
                    kind,
                    strength: Some(strength),
                })
        })
        .collect()
}

fn strong_group(hammers: usize, pins: usize, last: &Candle) -> Option<(AlertKind, f64, f64)> {
    let total = hammers + pins;
    if total < STRONG_GROUP_MIN_PATTERNS {
        return None;
    }

    let extra = |count: usize| (count - STRONG_GROUP_MIN_PATTERNS) as f64 * 0.02;
    if hammers >= STRONG_GROUP_MIN_PATTERNS {
        Some((
            AlertKind::StrongHammerGroup,
            (0.92 + extra(hammers)).min(0.98),
            last.low,
        ))
    } else if pins >= STRONG_GROUP_MIN_PATTERNS {
        Some((
            AlertKind::StrongTopPinGroup,
            (0.90 + extra(pins)).min(0.96),
            last.high,
        ))
    } else {
        let price = if hammers > pins { last.low } else { last.high };
        Some((
            AlertKind::StrongMixedPatternGroup,
            (0.88 + extra(total)).min(0.94),
            price,
        ))
    }
}

/// Run every detector over a candle series using the default 20 / 2 band.
///
/// Detector outputs are concatenated in a fixed order; each block is in
/// ascending index order.
pub fn detect_all_signals(candles: &[Candle]) -> Vec<Alert> {
    if candles.is_empty() {
        return Vec::new();
    }

    let bands = compute_default_band(candles);
    let mut alerts = detect_lower_band_doji(candles, &bands, DEFAULT_DOJI_TOLERANCE);
    alerts.extend(detect_lower_band_hammer(candles, &bands));
    alerts.extend(detect_consecutive_hammers(candles, &bands));
    alerts.extend(detect_upper_band_hanging_man(candles, &bands));
    alerts.extend(detect_band_engulfing(candles, &bands));
    alerts.extend(detect_strong_pattern_groups(candles, &bands));
    alerts
}
