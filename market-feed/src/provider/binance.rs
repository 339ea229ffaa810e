use super::{
    http::{PriceEndpoint, parse_price},
    symbol::CanonicalSymbol,
};
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};

/// Binance spot REST API.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/rest-api/market-data-endpoints#symbol-price-ticker>
#[derive(Debug, Clone, Copy)]
pub struct Binance;

/// `GET /ticker/price?symbol=BTCUSDT` response.
///
/// ### Raw Payload Example
/// ```json
/// {"symbol":"BTCUSDT","price":"64250.10000000"}
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceTickerPrice {
    #[serde(default)]
    pub symbol: String,
    pub price: String,
}

impl PriceEndpoint for Binance {
    type Response = BinanceTickerPrice;

    fn url(base: &str, symbol: &CanonicalSymbol) -> Result<String, ProviderError> {
        Ok(format!("{base}/ticker/price?symbol={}", symbol.joined()))
    }

    fn extract(response: Self::Response, _: &CanonicalSymbol) -> Result<f64, ProviderError> {
        parse_price(&response.price, "price")
    }
}
