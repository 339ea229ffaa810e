use super::{
    http::{PriceEndpoint, validate_price},
    symbol::CanonicalSymbol,
};
use crate::error::ProviderError;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

/// CoinGecko simple price API.
///
/// See docs: <https://docs.coingecko.com/reference/simple-price>
#[derive(Debug, Clone, Copy)]
pub struct CoinGecko;

/// `GET /simple/price?ids=bitcoin&vs_currencies=usd` response, keyed by coin id.
///
/// ### Raw Payload Example
/// ```json
/// {"bitcoin":{"usd":64250.12}}
/// ```
pub type CoinGeckoSimplePrice = FnvHashMap<String, CoinGeckoQuote>;

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct CoinGeckoQuote {
    #[serde(default)]
    pub usd: Option<f64>,
}

impl PriceEndpoint for CoinGecko {
    type Response = CoinGeckoSimplePrice;

    fn url(base: &str, symbol: &CanonicalSymbol) -> Result<String, ProviderError> {
        Ok(format!(
            "{base}/simple/price?ids={}&vs_currencies=usd",
            symbol.coingecko_id()
        ))
    }

    fn extract(response: Self::Response, symbol: &CanonicalSymbol) -> Result<f64, ProviderError> {
        let id = symbol.coingecko_id();
        let usd = response
            .get(id.as_str())
            .and_then(|quote| quote.usd)
            .ok_or_else(|| ProviderError::Malformed(format!("missing {id}.usd")))?;
        validate_price(usd, "usd")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coingecko_extract() {
        let btc = CanonicalSymbol::new("BTC", "USDT");

        let response: CoinGeckoSimplePrice =
            serde_json::from_str(r#"{"bitcoin":{"usd":64250.12}}"#).unwrap();
        assert_eq!(CoinGecko::extract(response, &btc), Ok(64250.12));

        let response: CoinGeckoSimplePrice = serde_json::from_str(r#"{}"#).unwrap();
        assert!(matches!(
            CoinGecko::extract(response, &btc),
            Err(ProviderError::Malformed(_))
        ));

        assert_eq!(
            CoinGecko::url("https://api.coingecko.com/api/v3", &btc).unwrap(),
            "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd"
        );
    }
}
