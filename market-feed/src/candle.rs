use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::str::FromStr;

/// A single OHLCV bar for one [`Period`] bucket.
///
/// `time` is the bucket open time in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Absolute size of the candle body.
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Total high-low range.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Candle bucket granularity.
///
/// Wire strings follow the exchange convention (`1m`, `4h`, `1M`, ...). A month
/// is approximated as 30 days.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Period {
    #[serde(rename = "1m")]
    #[display("1m")]
    Minute1,
    #[serde(rename = "5m")]
    #[display("5m")]
    Minute5,
    #[serde(rename = "15m")]
    #[display("15m")]
    Minute15,
    #[serde(rename = "30m")]
    #[display("30m")]
    Minute30,
    #[serde(rename = "1h")]
    #[display("1h")]
    Hour1,
    #[serde(rename = "2h")]
    #[display("2h")]
    Hour2,
    #[serde(rename = "3h")]
    #[display("3h")]
    Hour3,
    #[serde(rename = "4h")]
    #[display("4h")]
    Hour4,
    #[serde(rename = "1d")]
    #[display("1d")]
    Day1,
    #[serde(rename = "1w")]
    #[display("1w")]
    Week1,
    #[serde(rename = "1M")]
    #[display("1M")]
    Month1,
}

impl Period {
    /// The finest granularity push ticks are reconciled at.
    pub const FINEST: Period = Period::Minute1;

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Minute1 => "1m",
            Period::Minute5 => "5m",
            Period::Minute15 => "15m",
            Period::Minute30 => "30m",
            Period::Hour1 => "1h",
            Period::Hour2 => "2h",
            Period::Hour3 => "3h",
            Period::Hour4 => "4h",
            Period::Day1 => "1d",
            Period::Week1 => "1w",
            Period::Month1 => "1M",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            Period::Minute1 => 1,
            Period::Minute5 => 5,
            Period::Minute15 => 15,
            Period::Minute30 => 30,
            Period::Hour1 => 60,
            Period::Hour2 => 120,
            Period::Hour3 => 180,
            Period::Hour4 => 240,
            Period::Day1 => 1_440,
            Period::Week1 => 10_080,
            Period::Month1 => 43_200,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.minutes() * 60_000
    }

    /// Align an epoch millisecond timestamp to the start of its bucket.
    pub fn bucket_start(&self, ts: i64) -> i64 {
        ts - ts.rem_euclid(self.duration_ms())
    }

    pub fn is_finest(&self) -> bool {
        *self == Self::FINEST
    }
}

impl FromStr for Period {
    type Err = UnknownPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Period::Minute1),
            "5m" => Ok(Period::Minute5),
            "15m" => Ok(Period::Minute15),
            "30m" => Ok(Period::Minute30),
            "1h" => Ok(Period::Hour1),
            "2h" => Ok(Period::Hour2),
            "3h" => Ok(Period::Hour3),
            "4h" => Ok(Period::Hour4),
            "1d" => Ok(Period::Day1),
            "1w" => Ok(Period::Week1),
            "1M" => Ok(Period::Month1),
            other => Err(UnknownPeriod(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown candle period: {0}")]
pub struct UnknownPeriod(pub String);

/// Push-style price update for the live candle of a symbol.
///
/// Producers send either `time` or `timestamp`; `time` wins when both are set.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PriceTick {
    pub symbol: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceTick {
    pub fn event_time(&self) -> Option<i64> {
        self.time.or(self.timestamp)
    }

    /// Candle carried by this tick, stamped with the given time.
    pub fn to_candle(&self, time: i64) -> Candle {
        Candle {
            time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// Normalise a symbol for matching push events against a selection.
///
/// Strips `_`, `-` and `/` separators and upper-cases (eg/ `btc_usdt` -> `BTCUSDT`).
pub fn normalize_symbol(symbol: &str) -> SmolStr {
    symbol
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | '/'))
        .flat_map(char::to_uppercase)
        .collect()
}
