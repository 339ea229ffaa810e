use super::{
    http::{PriceEndpoint, parse_price},
    symbol::CanonicalSymbol,
};
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};

/// Gate.io v4 spot API.
///
/// See docs: <https://www.gate.io/docs/developers/apiv4/#retrieve-ticker-information>
#[derive(Debug, Clone, Copy)]
pub struct GateIo;

/// One element of the `GET /spot/tickers?currency_pair=BTC_USDT` array.
///
/// ### Raw Payload Example
/// ```json
/// [{"currency_pair":"BTC_USDT","last":"64250.1"}]
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct GateIoTicker {
    #[serde(default)]
    pub currency_pair: String,
    pub last: String,
}

impl PriceEndpoint for GateIo {
    type Response = Vec<GateIoTicker>;

    fn url(base: &str, symbol: &CanonicalSymbol) -> Result<String, ProviderError> {
        Ok(format!("{base}/spot/tickers?currency_pair={}", symbol.pair("_")))
    }

    fn extract(response: Self::Response, _: &CanonicalSymbol) -> Result<f64, ProviderError> {
        let ticker = response
            .first()
            .ok_or_else(|| ProviderError::Malformed("empty ticker list".to_string()))?;
        parse_price(&ticker.last, "last")
    }
}
