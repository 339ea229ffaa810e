use crate::{candle::normalize_symbol, error::ProviderError};
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

/// Quote currency assumed when a symbol names only a base asset (eg/ `bitcoin`).
pub const DEFAULT_QUOTE: &str = "USDT";

/// Quote suffixes recognised when splitting a concatenated pair, longest first.
const KNOWN_QUOTES: &[&str] = &["USDT", "USDC", "USD"];

/// Provider-independent `BASE/QUOTE` pair that each adapter maps to its own
/// naming.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct CanonicalSymbol {
    pub base: SmolStr,
    pub quote: SmolStr,
}

impl CanonicalSymbol {
    pub fn new(base: impl Into<SmolStr>, quote: impl Into<SmolStr>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Concatenated pair with the given separator, eg/ `BTC-USDT`.
    pub fn pair(&self, separator: &str) -> String {
        format!("{}{}{}", self.base, separator, self.quote)
    }

    /// Exchange-style concatenated pair, eg/ `BTCUSDT`.
    pub fn joined(&self) -> SmolStr {
        format_smolstr!("{}{}", self.base, self.quote)
    }

    /// CoinGecko coin id. Unknown assets fall back to the lowercase base.
    pub fn coingecko_id(&self) -> SmolStr {
        match self.base.as_str() {
            "BTC" => SmolStr::new_static("bitcoin"),
            "ETH" => SmolStr::new_static("ethereum"),
            "SOL" => SmolStr::new_static("solana"),
            other => SmolStr::new(other.to_lowercase()),
        }
    }

    /// Kraken pair name, which lists bitcoin as `XBT`.
    pub fn kraken_pair(&self) -> String {
        match self.base.as_str() {
            "BTC" => format!("XBT{}", self.quote),
            _ => self.pair(""),
        }
    }
}

impl Display for CanonicalSymbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for CanonicalSymbol {
    type Err = ProviderError;

    /// Accepts coin names (`bitcoin`), tickers (`btc`), and pairs in any of the
    /// common separator styles (`BTCUSDT`, `btc_usdt`, `ETH-USDC`).
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ProviderError::UnsupportedSymbol(input.to_string()));
        }

        let alias = match trimmed.to_lowercase().as_str() {
            "bitcoin" | "btc" => Some("BTC"),
            "ethereum" | "eth" => Some("ETH"),
            "solana" | "sol" => Some("SOL"),
            _ => None,
        };
        if let Some(base) = alias {
            return Ok(Self::new(base, DEFAULT_QUOTE));
        }

        let normalized = normalize_symbol(trimmed);
        if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ProviderError::UnsupportedSymbol(input.to_string()));
        }

        let split = KNOWN_QUOTES.iter().find_map(|quote| {
            normalized
                .strip_suffix(*quote)
                .filter(|base| !base.is_empty())
                .map(|base| Self::new(base, *quote))
        });

        Ok(split.unwrap_or_else(|| Self::new(normalized, DEFAULT_QUOTE)))
    }
}
