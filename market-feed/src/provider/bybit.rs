use super::{
    http::{PriceEndpoint, parse_price},
    symbol::CanonicalSymbol,
};
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};

/// Bybit v5 market API.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/market/tickers>
#[derive(Debug, Clone, Copy)]
pub struct Bybit;

/// `GET /market/tickers?category=spot&symbol=BTCUSDT` response.
///
/// ### Raw Payload Example
/// ```json
/// {"retCode":0,"retMsg":"OK","result":{"category":"spot","list":[{"symbol":"BTCUSDT","lastPrice":"64250.1"}]}}
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitTickerResponse {
    pub ret_code: i64,
    #[serde(default)]
    pub ret_msg: String,
    #[serde(default)]
    pub result: Option<BybitTickerList>,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BybitTickerList {
    #[serde(default)]
    pub list: Vec<BybitTicker>,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitTicker {
    #[serde(default)]
    pub symbol: String,
    pub last_price: String,
}

impl PriceEndpoint for Bybit {
    type Response = BybitTickerResponse;

    fn url(base: &str, symbol: &CanonicalSymbol) -> Result<String, ProviderError> {
        Ok(format!(
            "{base}/market/tickers?category=spot&symbol={}",
            symbol.joined()
        ))
    }

    fn extract(response: Self::Response, _: &CanonicalSymbol) -> Result<f64, ProviderError> {
        if response.ret_code != 0 {
            return Err(ProviderError::Rejected(format!(
                "retCode {}: {}",
                response.ret_code, response.ret_msg
            )));
        }

        let ticker = response
            .result
            .and_then(|result| result.list.into_iter().next())
            .ok_or_else(|| ProviderError::Malformed("empty result list".to_string()))?;
        parse_price(&ticker.last_price, "lastPrice")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bybit_extract() {
        struct TestCase {
            input: &'static str,
            expected: Result<f64, ()>,
        }

        let tests = vec![
            TestCase {
                // TC0
                input: r#"{"retCode":0,"retMsg":"OK","result":{"category":"spot","list":[{"symbol":"BTCUSDT","lastPrice":"64250.1"}]}}"#,
                expected: Ok(64250.1),
            },
            TestCase {
                // TC1: rejected
                input: r#"{"retCode":10001,"retMsg":"params error","result":{}}"#,
                expected: Err(()),
            },
            TestCase {
                // TC2: empty list
                input: r#"{"retCode":0,"retMsg":"OK","result":{"category":"spot","list":[]}}"#,
                expected: Err(()),
            },
        ];

        let symbol = CanonicalSymbol::new("BTC", "USDT");
        for (index, test) in tests.into_iter().enumerate() {
            let response = serde_json::from_str::<BybitTickerResponse>(test.input).unwrap();
            let actual = Bybit::extract(response, &symbol).map_err(|_| ());
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }

        assert_eq!(
            Bybit::url("https://api.bybit.com/v5", &symbol).unwrap(),
            "https://api.bybit.com/v5/market/tickers?category=spot&symbol=BTCUSDT"
        );
    }
}
