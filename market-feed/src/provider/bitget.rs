use super::{
    http::{PriceEndpoint, parse_price},
    symbol::CanonicalSymbol,
};
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Bitget spot market data.
///
/// The descriptor base points at the mix (futures) API; spot tickers live on the
/// same host under `/api/spot/v1`.
///
/// See docs: <https://bitgetlimited.github.io/apidoc/en/spot/#get-single-ticker>
#[derive(Debug, Clone, Copy)]
pub struct Bitget;

const SPOT_TICKER_PATH: &str = "/api/spot/v1/market/ticker";

/// `GET /api/spot/v1/market/ticker?symbol=BTCUSDT` response.
///
/// ### Raw Payload Example
/// ```json
/// {"code":"00000","msg":"success","data":{"symbol":"BTCUSDT","close":"64250.1"}}
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BitgetTickerResponse {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<BitgetTicker>,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BitgetTicker {
    #[serde(default)]
    pub symbol: String,
    pub close: String,
}

impl PriceEndpoint for Bitget {
    type Response = BitgetTickerResponse;

    fn url(base: &str, symbol: &CanonicalSymbol) -> Result<String, ProviderError> {
        let mut url = Url::parse(base)
            .map_err(|error| ProviderError::Transport(format!("invalid base url {base}: {error}")))?;
        url.set_path(SPOT_TICKER_PATH);
        url.set_query(Some(&format!("symbol={}", symbol.joined())));
        Ok(url.to_string())
    }

    fn extract(response: Self::Response, _: &CanonicalSymbol) -> Result<f64, ProviderError> {
        if response.code != "00000" {
            return Err(ProviderError::Rejected(format!(
                "code {}: {}",
                response.code, response.msg
            )));
        }

        let ticker = response
            .data
            .ok_or_else(|| ProviderError::Malformed("missing data".to_string()))?;
        parse_price(&ticker.close, "close")
    }
}
