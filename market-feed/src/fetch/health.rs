use super::{PriceFetcher, attempt, parse_symbol};
use crate::{error::FetchError, provider::ProviderKind};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::{info, warn};

/// Availability of one provider as seen by [`PriceFetcher::health_check`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub name: SmolStr,
    pub kind: ProviderKind,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PriceFetcher {
    /// Probe every enabled provider once, one after another, using each
    /// descriptor's own timeout.
    pub async fn health_check(&self, symbol: &str) -> Result<Vec<ProviderHealth>, FetchError> {
        let symbol = parse_symbol(symbol)?;
        let mut report = Vec::with_capacity(self.adapters.len());

        for adapter in &self.adapters {
            let descriptor = adapter.descriptor();
            let (result, elapsed_ms) = attempt(adapter, &symbol, descriptor.timeout()).await;

            let health = match result {
                Ok(price) => {
                    info!(provider = %descriptor.name, price, elapsed_ms, "provider available");
                    ProviderHealth {
                        name: descriptor.name.clone(),
                        kind: descriptor.kind,
                        available: true,
                        price: Some(price),
                        elapsed_ms,
                        error: None,
                    }
                }
                Err(error) => {
                    warn!(provider = %descriptor.name, %error, elapsed_ms, "provider unavailable");
                    ProviderHealth {
                        name: descriptor.name.clone(),
                        kind: descriptor.kind,
                        available: false,
                        price: None,
                        elapsed_ms,
                        error: Some(error.to_string()),
                    }
                }
            };
            report.push(health);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fetch::mock::MockAdapter, provider::PriceAdapter};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_check_probes_every_provider_once() {
        let down = Arc::new(MockAdapter::failing("down", 1));
        let up = Arc::new(MockAdapter::ok("up", 2, 42.0));
        let fetcher = PriceFetcher::new(vec![down.clone() as Arc<dyn PriceAdapter>, up.clone()]);

        let report = fetcher.health_check("btc").await.unwrap();

        let summary = report
            .iter()
            .map(|h| (h.name.as_str(), h.available, h.price))
            .collect::<Vec<_>>();
        assert_eq!(summary, vec![("down", false, None), ("up", true, Some(42.0))]);
        assert_eq!(down.calls(), 1);
        assert_eq!(up.calls(), 1);
    }

    #[tokio::test]
    async fn test_health_check_rejects_bad_symbol() {
        let fetcher = PriceFetcher::new(Vec::new());
        assert!(matches!(
            fetcher.health_check("").await,
            Err(FetchError::Symbol(_))
        ));
    }
}
