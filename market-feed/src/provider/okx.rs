use super::{
    http::{PriceEndpoint, parse_price},
    symbol::CanonicalSymbol,
};
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};

/// OKX v5 public market data.
///
/// See docs: <https://www.okx.com/docs-v5/en/#public-data-rest-api-get-ticker>
#[derive(Debug, Clone, Copy)]
pub struct Okx;

/// `GET /market/ticker?instId=BTC-USDT` response.
///
/// ### Raw Payload Example
/// ```json
/// {"code":"0","msg":"","data":[{"instId":"BTC-USDT","last":"64250.1"}]}
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct OkxTickerResponse {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Vec<OkxTicker>,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxTicker {
    #[serde(default)]
    pub inst_id: String,
    pub last: String,
}

impl PriceEndpoint for Okx {
    type Response = OkxTickerResponse;

    fn url(base: &str, symbol: &CanonicalSymbol) -> Result<String, ProviderError> {
        Ok(format!("{base}/market/ticker?instId={}", symbol.pair("-")))
    }

    fn extract(response: Self::Response, _: &CanonicalSymbol) -> Result<f64, ProviderError> {
        if response.code != "0" {
            return Err(ProviderError::Rejected(format!(
                "code {}: {}",
                response.code, response.msg
            )));
        }

        let ticker = response
            .data
            .first()
            .ok_or_else(|| ProviderError::Malformed("empty data".to_string()))?;
        parse_price(&ticker.last, "last")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_okx_extract() {
        struct TestCase {
            input: &'static str,
            expected: Result<f64, ()>,
        }

        let tests = vec![
            TestCase {
                // TC0
                input: r#"{"code":"0","msg":"","data":[{"instId":"BTC-USDT","last":"64250.1"}]}"#,
                expected: Ok(64250.1),
            },
            TestCase {
                // TC1: error code
                input: r#"{"code":"51001","msg":"Instrument ID does not exist","data":[]}"#,
                expected: Err(()),
            },
            TestCase {
                // TC2: no tickers
                input: r#"{"code":"0","msg":"","data":[]}"#,
                expected: Err(()),
            },
        ];

        let symbol = CanonicalSymbol::new("BTC", "USDT");
        for (index, test) in tests.into_iter().enumerate() {
            let response = serde_json::from_str::<OkxTickerResponse>(test.input).unwrap();
            let actual = Okx::extract(response, &symbol).map_err(|_| ());
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }

        assert_eq!(
            Okx::url("https://www.okx.com/api/v5", &symbol).unwrap(),
            "https://www.okx.com/api/v5/market/ticker?instId=BTC-USDT"
        );
    }
}
