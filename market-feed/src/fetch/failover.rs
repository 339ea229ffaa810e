use super::{
    AttemptOutcome, AttemptRecord, FetchOptions, PriceFetcher, PriceQuote, attempt, parse_symbol,
};
use crate::{error::FetchError, provider::symbol::CanonicalSymbol};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Outcome of [`PriceFetcher::fetch_failover`].
///
/// `quote` is `None` when every provider exhausted its retries; `attempts` always
/// holds the complete audit trail in the order the reads happened.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailoverReport {
    pub symbol: CanonicalSymbol,
    pub quote: Option<PriceQuote>,
    pub attempts: Vec<AttemptRecord>,
}

impl FailoverReport {
    pub fn is_success(&self) -> bool {
        self.quote.is_some()
    }

    pub fn price(&self) -> Option<f64> {
        self.quote.as_ref().map(|quote| quote.price)
    }
}

impl PriceFetcher {
    /// Try providers in ascending priority until one returns a price.
    ///
    /// Each provider gets `options.max_retries` attempts with `options.retry_delay`
    /// between them; the first success short-circuits. Provider failures never
    /// abort the run, only an empty provider set or an unparseable symbol do.
    pub async fn fetch_failover(
        &self,
        symbol: &str,
        options: &FetchOptions,
    ) -> Result<FailoverReport, FetchError> {
        let providers = self.select(options.allowed_providers.as_deref())?;
        let symbol = parse_symbol(symbol)?;
        let mut attempts = Vec::new();

        for (rank, adapter) in providers.iter().enumerate() {
            let descriptor = adapter.descriptor();
            let timeout = options.timeout.unwrap_or_else(|| descriptor.timeout());
            debug!(
                provider = %descriptor.name,
                rank = rank + 1,
                total = providers.len(),
                %symbol,
                "trying price provider"
            );

            for retry_index in 0..options.attempts() {
                let (result, elapsed_ms) = attempt(adapter, &symbol, timeout).await;

                match result {
                    Ok(price) => {
                        attempts.push(AttemptRecord {
                            source: descriptor.name.clone(),
                            outcome: AttemptOutcome::Success,
                            elapsed_ms,
                            retry_index,
                            error: None,
                        });
                        info!(
                            provider = %descriptor.name,
                            %symbol,
                            price,
                            elapsed_ms,
                            attempts = attempts.len(),
                            "price fetched"
                        );

                        return Ok(FailoverReport {
                            symbol,
                            quote: Some(PriceQuote {
                                source: descriptor.name.clone(),
                                kind: descriptor.kind,
                                price,
                                elapsed_ms,
                                received_at: Utc::now(),
                            }),
                            attempts,
                        });
                    }
                    Err(error) => {
                        attempts.push(AttemptRecord {
                            source: descriptor.name.clone(),
                            outcome: AttemptOutcome::Failure,
                            elapsed_ms,
                            retry_index,
                            error: Some(error.to_string()),
                        });

                        if retry_index + 1 < options.attempts() {
                            debug!(
                                provider = %descriptor.name,
                                retry = retry_index + 2,
                                max = options.attempts(),
                                %error,
                                "price read failed, retrying"
                            );
                            tokio::time::sleep(options.retry_delay).await;
                        } else {
                            warn!(
                                provider = %descriptor.name,
                                %symbol,
                                %error,
                                "price provider exhausted retries"
                            );
                        }
                    }
                }
            }
        }

        warn!(%symbol, attempts = attempts.len(), "all price providers failed");
        Ok(FailoverReport {
            symbol,
            quote: None,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ProviderError,
        fetch::mock::MockAdapter,
        provider::PriceAdapter,
    };
    use std::{sync::Arc, time::Duration};
    use tokio::time::Instant;

    fn sources(report: &FailoverReport) -> Vec<(&str, AttemptOutcome, u32)> {
        report
            .attempts
            .iter()
            .map(|a| (a.source.as_str(), a.outcome, a.retry_index))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_retries_then_falls_through() {
        let first = Arc::new(MockAdapter::failing("first", 1));
        let second = Arc::new(MockAdapter::failing("second", 2));
        let third = Arc::new(MockAdapter::ok("third", 3, 64_000.0));
        let fetcher = PriceFetcher::new(vec![
            first.clone() as Arc<dyn PriceAdapter>,
            second.clone(),
            third.clone(),
        ]);

        let start = Instant::now();
        let report = fetcher
            .fetch_failover("bitcoin", &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(report.price(), Some(64_000.0));
        assert_eq!(report.quote.as_ref().map(|q| q.source.as_str()), Some("third"));
        assert_eq!(
            sources(&report),
            vec![
                ("first", AttemptOutcome::Failure, 0),
                ("first", AttemptOutcome::Failure, 1),
                ("first", AttemptOutcome::Failure, 2),
                ("second", AttemptOutcome::Failure, 0),
                ("second", AttemptOutcome::Failure, 1),
                ("second", AttemptOutcome::Failure, 2),
                ("third", AttemptOutcome::Success, 0),
            ]
        );
        assert_eq!(first.calls(), 3);
        assert_eq!(second.calls(), 3);
        assert_eq!(third.calls(), 1);

        // Two 500ms pauses per exhausted provider, none when moving on
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(2000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2500), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_recovers_on_retry() {
        let flaky = Arc::new(MockAdapter::new(
            "flaky",
            1,
            [
                Err(ProviderError::Status {
                    status: 502,
                    body: String::new(),
                }),
                Ok(100.0),
            ],
        ));
        let backup = Arc::new(MockAdapter::ok("backup", 2, 200.0));
        let fetcher = PriceFetcher::new(vec![flaky.clone() as Arc<dyn PriceAdapter>, backup.clone()]);

        let report = fetcher
            .fetch_failover("BTCUSDT", &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(report.price(), Some(100.0));
        assert_eq!(
            sources(&report),
            vec![
                ("flaky", AttemptOutcome::Failure, 0),
                ("flaky", AttemptOutcome::Success, 1),
            ]
        );
        assert_eq!(backup.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_all_fail_returns_full_trail() {
        let fetcher = PriceFetcher::new(vec![
            Arc::new(MockAdapter::failing("a", 1)) as Arc<dyn PriceAdapter>,
            Arc::new(MockAdapter::failing("b", 2)),
        ]);

        let report = fetcher
            .fetch_failover("eth", &FetchOptions::default().with_max_retries(2))
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.attempts.len(), 4);
        assert!(report.attempts.iter().all(|a| a.error.is_some()));
        assert_eq!(report.symbol, CanonicalSymbol::new("ETH", "USDT"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_timeout_counts_as_failed_attempt() {
        let slow = Arc::new(MockAdapter::ok("slow", 1, 1.0).with_delay(Duration::from_secs(30)));
        let fast = Arc::new(MockAdapter::ok("fast", 2, 2.0));
        let fetcher = PriceFetcher::new(vec![slow.clone() as Arc<dyn PriceAdapter>, fast]);

        let options = FetchOptions::default()
            .with_max_retries(1)
            .with_timeout(Duration::from_millis(100));
        let report = fetcher.fetch_failover("btc", &options).await.unwrap();

        assert_eq!(report.price(), Some(2.0));
        assert_eq!(report.attempts[0].outcome, AttemptOutcome::Failure);
        assert_eq!(
            report.attempts[0].error.as_deref(),
            Some(ProviderError::Timeout(Duration::from_millis(100)).to_string().as_str())
        );
        assert!(report.attempts[0].elapsed_ms >= 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_equal_priority_keeps_declaration_order() {
        let fetcher = PriceFetcher::new(vec![
            Arc::new(MockAdapter::failing("declared-first", 5)) as Arc<dyn PriceAdapter>,
            Arc::new(MockAdapter::ok("declared-second", 5, 3.0)),
        ]);

        let report = fetcher
            .fetch_failover("sol", &FetchOptions::default().with_max_retries(1))
            .await
            .unwrap();

        assert_eq!(
            sources(&report),
            vec![
                ("declared-first", AttemptOutcome::Failure, 0),
                ("declared-second", AttemptOutcome::Success, 0),
            ]
        );
    }

    #[tokio::test]
    async fn test_failover_empty_provider_set_is_error() {
        let fetcher = PriceFetcher::new(vec![
            Arc::new(MockAdapter::ok("OKX", 1, 1.0)) as Arc<dyn PriceAdapter>,
        ]);

        let options = FetchOptions::default().with_allowed_providers(["Kraken"]);
        assert_eq!(
            fetcher.fetch_failover("btc", &options).await,
            Err(FetchError::NoProviders)
        );

        let options = FetchOptions::default().with_allowed_providers(["okx"]);
        assert!(fetcher.fetch_failover("btc", &options).await.unwrap().is_success());
    }
}
