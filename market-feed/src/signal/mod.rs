use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Candle shape predicates.
pub mod pattern;

/// Band-relative alert detectors.
pub mod detect;

pub use detect::{
    DEFAULT_DOJI_TOLERANCE, detect_all_signals, detect_band_engulfing,
    detect_consecutive_hammers, detect_lower_band_doji, detect_lower_band_hammer,
    detect_strong_pattern_groups, detect_upper_band_hanging_man,
};
pub use pattern::{
    DEFAULT_DOJI_THRESHOLD, Engulfing, engulfing, is_consecutive_hammers, is_doji_pattern,
    is_hammer, is_hanging_man, is_long_top_pin, is_top_pin,
};

/// Pattern alert raised at one candle position.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub index: usize,
    pub time: i64,
    pub price: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_band: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_band: Option<f64>,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
}

/// Alert type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    BollingerDojiBottom,
    BollingerHammerBottom,
    BollingerConsecutiveHammers,
    BollingerHangingManTop,
    BollingerBullishEngulfing,
    BollingerBearishEngulfing,
    StrongHammerGroup,
    StrongTopPinGroup,
    StrongMixedPatternGroup,
    /// Tag produced by a backend this build does not know about.
    #[serde(other)]
    Other,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::BollingerDojiBottom => "bollinger_doji_bottom",
            AlertKind::BollingerHammerBottom => "bollinger_hammer_bottom",
            AlertKind::BollingerConsecutiveHammers => "bollinger_consecutive_hammers",
            AlertKind::BollingerHangingManTop => "bollinger_hanging_man_top",
            AlertKind::BollingerBullishEngulfing => "bollinger_bullish_engulfing",
            AlertKind::BollingerBearishEngulfing => "bollinger_bearish_engulfing",
            AlertKind::StrongHammerGroup => "strong_hammer_group",
            AlertKind::StrongTopPinGroup => "strong_top_pin_group",
            AlertKind::StrongMixedPatternGroup => "strong_mixed_pattern_group",
            AlertKind::Other => "other",
        }
    }

    /// Whether the alert points at a potential move up.
    pub fn is_bullish(&self) -> bool {
        matches!(
            self,
            AlertKind::BollingerDojiBottom
                | AlertKind::BollingerHammerBottom
                | AlertKind::BollingerConsecutiveHammers
                | AlertKind::BollingerBullishEngulfing
                | AlertKind::StrongHammerGroup
        )
    }
}

impl Display for AlertKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Most recent alert, ie/ the last element.
pub fn latest_alert(alerts: &[Alert]) -> Option<Alert> {
    alerts.last().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(index: usize, kind: AlertKind) -> Alert {
        Alert {
            index,
            time: index as i64 * 60_000,
            price: 100.0,
            close: 100.0,
            lower_band: Some(99.0),
            upper_band: None,
            kind,
            strength: Some(0.8),
        }
    }

    #[test]
    fn test_latest_alert() {
        assert_eq!(latest_alert(&[]), None);

        let alerts = vec![
            alert(3, AlertKind::BollingerDojiBottom),
            alert(9, AlertKind::StrongHammerGroup),
        ];
        assert_eq!(latest_alert(&alerts).map(|a| a.index), Some(9));
    }

    #[test]
    fn test_de_alert() {
        struct TestCase {
            input: &'static str,
            expected: Alert,
        }

        let tests = vec![
            TestCase {
                // TC0: lower band alert
                input: r#"{"index":3,"time":180000,"price":100.0,"close":100.0,"lowerBand":99.0,"type":"bollinger_doji_bottom","strength":0.8}"#,
                expected: alert(3, AlertKind::BollingerDojiBottom),
            },
            TestCase {
                // TC1: unknown type tag, no strength
                input: r#"{"index":1,"time":60000,"price":100.0,"close":100.0,"lowerBand":99.0,"type":"ema_cross"}"#,
                expected: Alert {
                    strength: None,
                    ..alert(1, AlertKind::Other)
                },
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = serde_json::from_str::<Alert>(test.input).unwrap();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_ser_alert_uses_wire_names() {
        let json = serde_json::to_value(alert(3, AlertKind::BollingerHangingManTop)).unwrap();
        assert_eq!(json["type"], "bollinger_hanging_man_top");
        assert_eq!(json["lowerBand"], 99.0);
        assert!(json.get("upperBand").is_none());
    }
}
