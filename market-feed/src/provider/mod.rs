use self::{
    binance::Binance, bitget::Bitget, bybit::Bybit, coingecko::CoinGecko, gateio::GateIo,
    http::RestPriceAdapter, kraken::Kraken, mexc::Mexc, okx::Okx, symbol::CanonicalSymbol,
};
use crate::error::ProviderError;
use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{sync::Arc, time::Duration};
use tracing::warn;

/// Provider-independent symbol handling.
pub mod symbol;

/// Generic JSON GET adapter shared by every provider.
pub mod http;

pub mod binance;
pub mod bitget;
pub mod bybit;
pub mod coingecko;
pub mod gateio;
pub mod kraken;
pub mod mexc;
pub mod okx;

/// Default per-request timeout of the built-in providers.
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 15_000;

/// Whether a provider aggregates prices across venues or is a venue itself.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[display("aggregator")]
    Aggregator,
    #[display("exchange")]
    Exchange,
}

/// Static configuration for one upstream price provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    pub name: SmolStr,
    #[serde(rename = "type", alias = "kind")]
    pub kind: ProviderKind,
    #[serde(alias = "baseUrl")]
    pub base_endpoint: String,
    pub priority: u32,
    #[serde(alias = "timeout", default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_MS
}

fn default_enabled() -> bool {
    true
}

impl ProviderDescriptor {
    pub fn new(
        name: impl Into<SmolStr>,
        kind: ProviderKind,
        base_endpoint: impl Into<String>,
        priority: u32,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            base_endpoint: base_endpoint.into(),
            priority,
            timeout_ms: DEFAULT_PROVIDER_TIMEOUT_MS,
            enabled: true,
        }
    }

    pub fn with_timeout_ms(self, timeout_ms: u64) -> Self {
        Self { timeout_ms, ..self }
    }

    pub fn with_enabled(self, enabled: bool) -> Self {
        Self { enabled, ..self }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Built-in provider list, in priority order.
pub fn default_providers() -> Vec<ProviderDescriptor> {
    use ProviderKind::*;
    vec![
        ProviderDescriptor::new("CoinGecko", Aggregator, "https://api.coingecko.com/api/v3", 1),
        ProviderDescriptor::new("OKX", Exchange, "https://www.okx.com/api/v5", 2),
        ProviderDescriptor::new("Kraken", Exchange, "https://api.kraken.com/0/public", 3),
        ProviderDescriptor::new("Gate.io", Exchange, "https://api.gateio.ws/api/v4", 4),
        ProviderDescriptor::new("MEXC", Exchange, "https://api.mexc.com/api/v3", 5),
        ProviderDescriptor::new("Bitget", Exchange, "https://api.bitget.com/api/mix/v1", 6),
        ProviderDescriptor::new("Binance", Exchange, "https://api.binance.com/api/v3", 7),
        ProviderDescriptor::new("Bybit", Exchange, "https://api.bybit.com/v5", 8),
    ]
}

/// A source able to return the last traded price of a [`CanonicalSymbol`].
#[async_trait]
pub trait PriceAdapter: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Perform one bounded read. Implementations must not retry.
    async fn fetch_price(
        &self,
        symbol: &CanonicalSymbol,
        timeout: Duration,
    ) -> Result<f64, ProviderError>;
}

/// Provider implementations known to this crate.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    CoinGecko,
    Okx,
    Kraken,
    GateIo,
    Mexc,
    Bitget,
    Binance,
    Bybit,
}

impl ProviderId {
    /// Resolve a descriptor name, ignoring case and punctuation (`Gate.io`, `gateio`).
    pub fn from_name(name: &str) -> Option<Self> {
        let key = name
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect::<String>()
            .to_ascii_lowercase();

        match key.as_str() {
            "coingecko" => Some(Self::CoinGecko),
            "okx" => Some(Self::Okx),
            "kraken" => Some(Self::Kraken),
            "gateio" | "gate" => Some(Self::GateIo),
            "mexc" => Some(Self::Mexc),
            "bitget" => Some(Self::Bitget),
            "binance" => Some(Self::Binance),
            "bybit" => Some(Self::Bybit),
            _ => None,
        }
    }
}

/// Bind a descriptor to its adapter implementation, if one exists.
pub fn adapter_for(
    descriptor: ProviderDescriptor,
    client: reqwest::Client,
) -> Option<Arc<dyn PriceAdapter>> {
    let adapter: Arc<dyn PriceAdapter> = match ProviderId::from_name(&descriptor.name)? {
        ProviderId::CoinGecko => Arc::new(RestPriceAdapter::<CoinGecko>::new(descriptor, client)),
        ProviderId::Okx => Arc::new(RestPriceAdapter::<Okx>::new(descriptor, client)),
        ProviderId::Kraken => Arc::new(RestPriceAdapter::<Kraken>::new(descriptor, client)),
        ProviderId::GateIo => Arc::new(RestPriceAdapter::<GateIo>::new(descriptor, client)),
        ProviderId::Mexc => Arc::new(RestPriceAdapter::<Mexc>::new(descriptor, client)),
        ProviderId::Bitget => Arc::new(RestPriceAdapter::<Bitget>::new(descriptor, client)),
        ProviderId::Binance => Arc::new(RestPriceAdapter::<Binance>::new(descriptor, client)),
        ProviderId::Bybit => Arc::new(RestPriceAdapter::<Bybit>::new(descriptor, client)),
    };
    Some(adapter)
}

/// Build adapters for every descriptor with a known implementation.
///
/// Descriptors without one are skipped with a warning.
pub fn build_adapters(
    descriptors: impl IntoIterator<Item = ProviderDescriptor>,
    client: &reqwest::Client,
) -> Vec<Arc<dyn PriceAdapter>> {
    descriptors
        .into_iter()
        .filter_map(|descriptor| {
            let name = descriptor.name.clone();
            let adapter = adapter_for(descriptor, client.clone());
            if adapter.is_none() {
                warn!(provider = %name, "no adapter implementation for provider, skipping");
            }
            adapter
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_providers_are_ranked_and_bound() {
        let providers = default_providers();
        assert_eq!(providers.len(), 8);

        let priorities = providers.iter().map(|p| p.priority).collect::<Vec<_>>();
        assert_eq!(priorities, (1..=8).collect::<Vec<_>>());

        for provider in &providers {
            assert!(provider.enabled);
            assert_eq!(provider.timeout(), Duration::from_secs(15));
            assert!(
                ProviderId::from_name(&provider.name).is_some(),
                "{} unbound",
                provider.name
            );
        }

        let adapters = build_adapters(providers, &reqwest::Client::new());
        assert_eq!(adapters.len(), 8);
        assert_eq!(adapters[3].descriptor().name, "Gate.io");
    }

    #[test]
    fn test_de_provider_descriptor() {
        struct TestCase {
            input: &'static str,
            expected: ProviderDescriptor,
        }

        let tests = vec![
            TestCase {
                // TC0: canonical field names
                input: r#"{"name":"OKX","type":"exchange","baseEndpoint":"https://www.okx.com/api/v5","priority":2,"timeoutMs":3000,"enabled":false}"#,
                expected: ProviderDescriptor::new(
                    "OKX",
                    ProviderKind::Exchange,
                    "https://www.okx.com/api/v5",
                    2,
                )
                .with_timeout_ms(3000)
                .with_enabled(false),
            },
            TestCase {
                // TC1: legacy field names, defaults applied
                input: r#"{"name":"CoinGecko","type":"aggregator","baseUrl":"https://api.coingecko.com/api/v3","priority":1}"#,
                expected: ProviderDescriptor::new(
                    "CoinGecko",
                    ProviderKind::Aggregator,
                    "https://api.coingecko.com/api/v3",
                    1,
                ),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = serde_json::from_str::<ProviderDescriptor>(test.input).unwrap();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_provider_id_from_name() {
        assert_eq!(ProviderId::from_name("Gate.io"), Some(ProviderId::GateIo));
        assert_eq!(ProviderId::from_name("gateio"), Some(ProviderId::GateIo));
        assert_eq!(ProviderId::from_name("BINANCE"), Some(ProviderId::Binance));
        assert_eq!(ProviderId::from_name("Huobi"), None);
    }
}
