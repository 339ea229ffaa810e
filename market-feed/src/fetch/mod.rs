use crate::{
    error::{FetchError, ProviderError},
    provider::{
        PriceAdapter, ProviderDescriptor, ProviderKind, build_adapters, symbol::CanonicalSymbol,
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

/// Sequential priority failover with per-provider retries.
pub mod failover;

/// Concurrent one-shot query of every provider.
pub mod fanout;

/// Sequential availability probe.
pub mod health;

pub use failover::FailoverReport;
pub use fanout::{FanOutReport, PriceRange, ProviderResult};
pub use health::ProviderHealth;

/// Default attempts per provider during failover.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default pause between two attempts against the same provider.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Per-call fetch parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Attempts per provider; values below 1 are treated as 1.
    pub max_retries: u32,
    /// Overrides every descriptor's own timeout when set.
    pub timeout: Option<Duration>,
    /// Restrict the run to these provider names (case-insensitive).
    pub allowed_providers: Option<Vec<String>>,
    pub retry_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: None,
            allowed_providers: None,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl FetchOptions {
    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    pub fn with_allowed_providers<I, S>(self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_providers: Some(providers.into_iter().map(Into::into).collect()),
            ..self
        }
    }

    pub fn with_retry_delay(self, retry_delay: Duration) -> Self {
        Self {
            retry_delay,
            ..self
        }
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// One provider read within a fetch operation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub source: SmolStr,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
    /// Zero-based attempt number against this source.
    pub retry_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Successful price read.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub source: SmolStr,
    pub kind: ProviderKind,
    pub price: f64,
    pub elapsed_ms: u64,
    pub received_at: DateTime<Utc>,
}

/// Multi-provider price fetcher.
///
/// Holds only enabled providers, ordered by ascending priority. Providers with
/// equal priority keep their declaration order.
#[derive(Clone)]
pub struct PriceFetcher {
    adapters: Vec<Arc<dyn PriceAdapter>>,
}

impl std::fmt::Debug for PriceFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceFetcher")
            .field(
                "providers",
                &self.providers().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PriceFetcher {
    pub fn new(adapters: impl IntoIterator<Item = Arc<dyn PriceAdapter>>) -> Self {
        let mut adapters = adapters
            .into_iter()
            .filter(|adapter| adapter.descriptor().enabled)
            .collect::<Vec<_>>();
        adapters.sort_by_key(|adapter| adapter.descriptor().priority);
        Self { adapters }
    }

    /// Build a fetcher backed by the REST adapters for `descriptors`.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ProviderDescriptor>,
        client: &reqwest::Client,
    ) -> Self {
        Self::new(build_adapters(descriptors, client))
    }

    /// Enabled providers in the order they are tried.
    pub fn providers(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.adapters.iter().map(|adapter| adapter.descriptor())
    }

    fn select(&self, allowed: Option<&[String]>) -> Result<Vec<&Arc<dyn PriceAdapter>>, FetchError> {
        let selected = self
            .adapters
            .iter()
            .filter(|adapter| match allowed {
                Some(names) => names
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(&adapter.descriptor().name)),
                None => true,
            })
            .collect::<Vec<_>>();

        if selected.is_empty() {
            Err(FetchError::NoProviders)
        } else {
            Ok(selected)
        }
    }
}

fn parse_symbol(symbol: &str) -> Result<CanonicalSymbol, FetchError> {
    symbol.parse().map_err(FetchError::Symbol)
}

/// One bounded read. A read exceeding `timeout` is reported as
/// [`ProviderError::Timeout`].
async fn attempt(
    adapter: &Arc<dyn PriceAdapter>,
    symbol: &CanonicalSymbol,
    timeout: Duration,
) -> (Result<f64, ProviderError>, u64) {
    let start = Instant::now();
    let result = match tokio::time::timeout(timeout, adapter.fetch_price(symbol, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(timeout)),
    };
    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    (result, elapsed_ms)
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
    };

    /// Adapter replaying a scripted sequence of results, repeating the last one.
    pub struct MockAdapter {
        descriptor: ProviderDescriptor,
        script: Mutex<VecDeque<Result<f64, ProviderError>>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl MockAdapter {
        pub fn new(
            name: &str,
            priority: u32,
            script: impl IntoIterator<Item = Result<f64, ProviderError>>,
        ) -> Self {
            Self {
                descriptor: ProviderDescriptor::new(
                    name,
                    ProviderKind::Exchange,
                    "http://localhost",
                    priority,
                ),
                script: Mutex::new(script.into_iter().collect()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn ok(name: &str, priority: u32, price: f64) -> Self {
            Self::new(name, priority, [Ok(price)])
        }

        pub fn failing(name: &str, priority: u32) -> Self {
            Self::new(
                name,
                priority,
                [Err(ProviderError::Transport("connection refused".to_string()))],
            )
        }

        pub fn with_delay(self, delay: Duration) -> Self {
            Self { delay, ..self }
        }

        pub fn with_enabled(self, enabled: bool) -> Self {
            Self {
                descriptor: self.descriptor.clone().with_enabled(enabled),
                ..self
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceAdapter for MockAdapter {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        async fn fetch_price(
            &self,
            _: &CanonicalSymbol,
            _: Duration,
        ) -> Result<f64, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let mut script = self.script.lock();
            if script.len() > 1 {
                script
                    .pop_front()
                    .unwrap_or(Err(ProviderError::Malformed("empty script".to_string())))
            } else {
                script
                    .front()
                    .cloned()
                    .unwrap_or(Err(ProviderError::Malformed("empty script".to_string())))
            }
        }
    }
}
