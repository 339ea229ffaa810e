use super::{
    http::{PriceEndpoint, parse_price},
    symbol::CanonicalSymbol,
};
use crate::error::ProviderError;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

/// Kraken public REST API.
///
/// See docs: <https://docs.kraken.com/api/docs/rest-api/get-ticker-information>
#[derive(Debug, Clone, Copy)]
pub struct Kraken;

/// `GET /Ticker?pair=XBTUSDT` response.
///
/// Kraken keys the result by its own internal pair name, which need not equal
/// the requested pair, so the first entry is used.
///
/// ### Raw Payload Example
/// ```json
/// {"error":[],"result":{"XBTUSDT":{"a":["64251.0","1","1.000"],"c":["64250.1","0.0012"]}}}
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct KrakenTickerResponse {
    #[serde(default)]
    pub error: Vec<String>,
    #[serde(default)]
    pub result: FnvHashMap<String, KrakenTicker>,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct KrakenTicker {
    /// Last trade closed: `[price, lot volume]`.
    #[serde(rename = "c", default)]
    pub last_trade: Vec<String>,
}

impl PriceEndpoint for Kraken {
    type Response = KrakenTickerResponse;

    fn url(base: &str, symbol: &CanonicalSymbol) -> Result<String, ProviderError> {
        Ok(format!("{base}/Ticker?pair={}", symbol.kraken_pair()))
    }

    fn extract(response: Self::Response, _: &CanonicalSymbol) -> Result<f64, ProviderError> {
        if !response.error.is_empty() {
            return Err(ProviderError::Rejected(response.error.join(", ")));
        }

        let price = response
            .result
            .values()
            .next()
            .and_then(|ticker| ticker.last_trade.first())
            .ok_or_else(|| ProviderError::Malformed("missing result ticker".to_string()))?;
        parse_price(price, "c")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kraken_extract() {
        struct TestCase {
            input: &'static str,
            expected: Result<f64, ()>,
        }

        let tests = vec![
            TestCase {
                // TC0
                input: r#"{"error":[],"result":{"XBTUSDT":{"a":["64251.0","1","1.000"],"c":["64250.1","0.0012"]}}}"#,
                expected: Ok(64250.1),
            },
            TestCase {
                // TC1: unknown pair
                input: r#"{"error":["EQuery:Unknown asset pair"]}"#,
                expected: Err(()),
            },
            TestCase {
                // TC2: ticker without last trade
                input: r#"{"error":[],"result":{"XBTUSDT":{}}}"#,
                expected: Err(()),
            },
        ];

        let symbol = CanonicalSymbol::new("BTC", "USDT");
        for (index, test) in tests.into_iter().enumerate() {
            let response = serde_json::from_str::<KrakenTickerResponse>(test.input).unwrap();
            let actual = Kraken::extract(response, &symbol).map_err(|_| ());
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }

        assert_eq!(
            Kraken::url("https://api.kraken.com/0/public", &symbol).unwrap(),
            "https://api.kraken.com/0/public/Ticker?pair=XBTUSDT"
        );
    }
}
