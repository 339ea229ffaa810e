use super::{FetchOptions, PriceFetcher, attempt, parse_symbol};
use crate::{
    error::FetchError,
    provider::{ProviderKind, symbol::CanonicalSymbol},
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::{debug, info};

/// Result of one provider during a fan-out.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub source: SmolStr,
    pub kind: ProviderKind,
    pub priority: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderResult {
    pub fn is_success(&self) -> bool {
        self.price.is_some()
    }
}

/// Lowest and highest successful price with the providers that reported them.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
    pub min_source: SmolStr,
    pub max_source: SmolStr,
}

impl PriceRange {
    pub fn spread(&self) -> f64 {
        self.max - self.min
    }
}

/// Outcome of [`PriceFetcher::fetch_all`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutReport {
    pub symbol: CanonicalSymbol,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Successes first, then ascending priority.
    pub results: Vec<ProviderResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<PriceRange>,
}

impl FanOutReport {
    fn new(symbol: CanonicalSymbol, mut results: Vec<ProviderResult>) -> Self {
        results.sort_by_key(|result| (!result.is_success(), result.priority));

        let prices = results
            .iter()
            .filter_map(|result| result.price.map(|price| (result.source.clone(), price)))
            .collect::<Vec<_>>();

        let average_price =
            (!prices.is_empty()).then(|| prices.iter().map(|(_, p)| p).sum::<f64>() / prices.len() as f64);

        // Ties resolve to the first entry in result order
        let price_range = prices.iter().fold(None, |range: Option<PriceRange>, (source, price)| {
            Some(match range {
                None => PriceRange {
                    min: *price,
                    max: *price,
                    min_source: source.clone(),
                    max_source: source.clone(),
                },
                Some(mut range) => {
                    if *price < range.min {
                        range.min = *price;
                        range.min_source = source.clone();
                    }
                    if *price > range.max {
                        range.max = *price;
                        range.max_source = source.clone();
                    }
                    range
                }
            })
        });

        let successful = prices.len();
        Self {
            symbol,
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
            average_price,
            price_range,
        }
    }

    /// `(source, price)` of every successful provider, in result order.
    pub fn prices(&self) -> impl Iterator<Item = (&str, f64)> {
        self.results
            .iter()
            .filter_map(|result| result.price.map(|price| (result.source.as_str(), price)))
    }
}

impl PriceFetcher {
    /// Query every selected provider concurrently, once, and summarise.
    ///
    /// `options.max_retries` and `options.retry_delay` are ignored.
    pub async fn fetch_all(
        &self,
        symbol: &str,
        options: &FetchOptions,
    ) -> Result<FanOutReport, FetchError> {
        let providers = self.select(options.allowed_providers.as_deref())?;
        let symbol = parse_symbol(symbol)?;
        debug!(%symbol, providers = providers.len(), "fanning out price request");

        let results = join_all(providers.into_iter().map(|adapter| {
            let symbol = &symbol;
            async move {
                let descriptor = adapter.descriptor();
                let timeout = options.timeout.unwrap_or_else(|| descriptor.timeout());
                let (result, elapsed_ms) = attempt(adapter, symbol, timeout).await;
                let (price, error) = match result {
                    Ok(price) => (Some(price), None),
                    Err(error) => (None, Some(error.to_string())),
                };

                ProviderResult {
                    source: descriptor.name.clone(),
                    kind: descriptor.kind,
                    priority: descriptor.priority,
                    price,
                    elapsed_ms,
                    error,
                }
            }
        }))
        .await;

        let report = FanOutReport::new(symbol, results);
        info!(
            symbol = %report.symbol,
            successful = report.successful,
            failed = report.failed,
            average = ?report.average_price,
            "fan-out complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fetch::mock::MockAdapter, provider::PriceAdapter};
    use std::{sync::Arc, time::Duration};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_orders_and_summarises() {
        let fetcher = PriceFetcher::new(vec![
            Arc::new(MockAdapter::failing("p1", 1)) as Arc<dyn PriceAdapter>,
            Arc::new(MockAdapter::ok("p3", 3, 102.0)),
            Arc::new(MockAdapter::ok("p2", 2, 100.0)),
        ]);

        let report = fetcher.fetch_all("btc", &FetchOptions::default()).await.unwrap();

        let order = report.results.iter().map(|r| r.source.as_str()).collect::<Vec<_>>();
        assert_eq!(order, vec!["p2", "p3", "p1"]);
        assert_eq!(report.total, 3);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.average_price, Some(101.0));
        assert_eq!(
            report.price_range,
            Some(PriceRange {
                min: 100.0,
                max: 102.0,
                min_source: "p2".into(),
                max_source: "p3".into(),
            })
        );
        assert_eq!(report.prices().collect::<Vec<_>>(), vec![("p2", 100.0), ("p3", 102.0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_runs_concurrently_without_retries() {
        let slow_a = Arc::new(MockAdapter::failing("a", 1).with_delay(Duration::from_millis(300)));
        let slow_b = Arc::new(MockAdapter::ok("b", 2, 5.0).with_delay(Duration::from_millis(300)));
        let fetcher = PriceFetcher::new(vec![
            slow_a.clone() as Arc<dyn PriceAdapter>,
            slow_b.clone(),
        ]);

        let start = Instant::now();
        let report = fetcher.fetch_all("eth", &FetchOptions::default()).await.unwrap();

        assert!(start.elapsed() < Duration::from_millis(600));
        assert_eq!(slow_a.calls(), 1);
        assert_eq!(slow_b.calls(), 1);
        assert_eq!(report.successful, 1);
    }

    #[tokio::test]
    async fn test_fetch_all_none_successful() {
        let fetcher = PriceFetcher::new(vec![
            Arc::new(MockAdapter::failing("a", 1)) as Arc<dyn PriceAdapter>,
        ]);

        let report = fetcher.fetch_all("btc", &FetchOptions::default()).await.unwrap();
        assert_eq!(report.successful, 0);
        assert_eq!(report.average_price, None);
        assert_eq!(report.price_range, None);
    }

    #[test]
    fn test_price_range_ties_resolve_to_first_in_order() {
        let result = |source: &str, priority, price| ProviderResult {
            source: source.into(),
            kind: ProviderKind::Exchange,
            priority,
            price: Some(price),
            elapsed_ms: 1,
            error: None,
        };

        let report = FanOutReport::new(
            CanonicalSymbol::new("BTC", "USDT"),
            vec![result("late", 9, 10.0), result("early", 1, 10.0)],
        );

        let range = report.price_range.unwrap();
        assert_eq!(range.min_source, "early");
        assert_eq!(range.max_source, "early");
        assert_eq!(range.spread(), 0.0);
    }
}
