use super::{
    binance::BinanceTickerPrice,
    http::{PriceEndpoint, parse_price},
    symbol::CanonicalSymbol,
};
use crate::error::ProviderError;

/// MEXC spot v3 API, which mirrors the Binance ticker shape.
///
/// See docs: <https://mexcdevelop.github.io/apidocs/spot_v3_en/#symbol-price-ticker>
#[derive(Debug, Clone, Copy)]
pub struct Mexc;

impl PriceEndpoint for Mexc {
    type Response = BinanceTickerPrice;

    fn url(base: &str, symbol: &CanonicalSymbol) -> Result<String, ProviderError> {
        Ok(format!("{base}/ticker/price?symbol={}", symbol.joined()))
    }

    fn extract(response: Self::Response, _: &CanonicalSymbol) -> Result<f64, ProviderError> {
        parse_price(&response.price, "price")
    }
}
