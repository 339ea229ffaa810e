use crate::{
    backend::{BinanceBackendConfig, StreamConfig},
    candle::Period,
    error::ConfigError,
    fetch::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, FetchOptions},
    provider::{ProviderDescriptor, default_providers},
    sync::{DEFAULT_BUFFER_CAPACITY, SyncConfig},
};
use smol_str::SmolStr;
use std::{path::Path, str::FromStr, time::Duration};
use tracing::{info, warn};

pub const ENV_PROVIDERS: &str = "MARKET_FEED_PROVIDERS";
pub const ENV_MAX_RETRIES: &str = "MARKET_FEED_MAX_RETRIES";
pub const ENV_TIMEOUT_MS: &str = "MARKET_FEED_TIMEOUT_MS";
pub const ENV_RETRY_DELAY_MS: &str = "MARKET_FEED_RETRY_DELAY_MS";
pub const ENV_POLL_INTERVAL_MS: &str = "MARKET_FEED_POLL_INTERVAL_MS";
pub const ENV_BUFFER_CAPACITY: &str = "MARKET_FEED_BUFFER_CAPACITY";
pub const ENV_REST_URL: &str = "MARKET_FEED_REST_URL";
pub const ENV_WS_URL: &str = "MARKET_FEED_WS_URL";

/// Runtime configuration shared by the fetcher, backend and controller.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub providers: Vec<ProviderDescriptor>,
    pub max_retries: u32,
    /// Per-read timeout applied to every provider.
    pub timeout: Duration,
    pub retry_delay: Duration,
    pub poll_interval: Duration,
    pub buffer_capacity: usize,
    pub rest_url: String,
    pub ws_url: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        let backend = BinanceBackendConfig::default();
        Self {
            providers: default_providers(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: Duration::from_millis(5000),
            retry_delay: DEFAULT_RETRY_DELAY,
            poll_interval: Duration::from_secs(2),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            rest_url: backend.rest_url,
            ws_url: backend.stream.url,
        }
    }
}

impl FeedConfig {
    /// Load from `MARKET_FEED_*` environment variables.
    ///
    /// Unset variables keep their defaults; unparseable numbers fall back with a
    /// warning. A provider file that cannot be read or parsed is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let providers = match lookup(ENV_PROVIDERS) {
            Some(path) => load_providers(path)?,
            None => defaults.providers,
        };

        let config = Self {
            providers,
            max_retries: parse_or(&lookup, ENV_MAX_RETRIES, defaults.max_retries),
            timeout: millis_or(&lookup, ENV_TIMEOUT_MS, defaults.timeout),
            retry_delay: millis_or(&lookup, ENV_RETRY_DELAY_MS, defaults.retry_delay),
            poll_interval: millis_or(&lookup, ENV_POLL_INTERVAL_MS, defaults.poll_interval),
            buffer_capacity: parse_or(&lookup, ENV_BUFFER_CAPACITY, defaults.buffer_capacity),
            rest_url: lookup(ENV_REST_URL).unwrap_or(defaults.rest_url),
            ws_url: lookup(ENV_WS_URL).unwrap_or(defaults.ws_url),
        };

        info!(
            providers = config.providers.len(),
            max_retries = config.max_retries,
            timeout_ms = config.timeout.as_millis() as u64,
            "loaded feed configuration"
        );
        Ok(config)
    }

    pub fn with_providers(self, providers: Vec<ProviderDescriptor>) -> Self {
        Self { providers, ..self }
    }

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..self
        }
    }

    pub fn with_rest_url(self, rest_url: impl Into<String>) -> Self {
        Self {
            rest_url: rest_url.into(),
            ..self
        }
    }

    pub fn with_ws_url(self, ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..self
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::default()
            .with_max_retries(self.max_retries)
            .with_timeout(self.timeout)
            .with_retry_delay(self.retry_delay)
    }

    pub fn backend_config(&self) -> BinanceBackendConfig {
        BinanceBackendConfig::default()
            .with_rest_url(self.rest_url.clone())
            .with_stream(StreamConfig::new(self.ws_url.clone()))
    }

    pub fn sync_config(&self, symbol: impl Into<SmolStr>, period: Period) -> SyncConfig {
        SyncConfig::new(symbol, period)
            .with_poll_interval(self.poll_interval)
            .with_buffer_capacity(self.buffer_capacity)
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, ?default, "invalid value, using default");
            default
        }),
    }
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    Duration::from_millis(parse_or(lookup, key, default.as_millis() as u64))
}

/// Read a JSON array of [`ProviderDescriptor`]s.
///
/// ### Example
/// ```json
/// [
///   {"name": "okx", "type": "exchange", "baseEndpoint": "https://www.okx.com", "priority": 1},
///   {"name": "kraken", "type": "exchange", "baseEndpoint": "https://api.kraken.com", "priority": 2, "enabled": false}
/// ]
/// ```
pub fn load_providers(path: impl AsRef<Path>) -> Result<Vec<ProviderDescriptor>, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
        path: path.display().to_string(),
        error: error.to_string(),
    })?;
    parse_providers(&raw).map_err(|error| match error {
        ConfigError::Parse { error, .. } => ConfigError::Parse {
            path: path.display().to_string(),
            error,
        },
        other => other,
    })
}

fn parse_providers(raw: &str) -> Result<Vec<ProviderDescriptor>, ConfigError> {
    let providers: Vec<ProviderDescriptor> =
        serde_json::from_str(raw).map_err(|error| ConfigError::Parse {
            path: String::new(),
            error: error.to_string(),
        })?;

    if !providers.iter().any(|provider| provider.enabled) {
        return Err(ConfigError::Invalid("no enabled providers".to_string()));
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnv::FnvHashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<FnvHashMap<_, _>>();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_from_lookup() {
        struct TestCase {
            vars: Vec<(&'static str, &'static str)>,
            expected: FeedConfig,
        }

        let tests = vec![
            TestCase {
                // TC0: nothing set
                vars: vec![],
                expected: FeedConfig::default(),
            },
            TestCase {
                // TC1: overrides
                vars: vec![
                    (ENV_MAX_RETRIES, "5"),
                    (ENV_TIMEOUT_MS, "1500"),
                    (ENV_POLL_INTERVAL_MS, " 250 "),
                    (ENV_WS_URL, "ws://localhost:9443/ws"),
                ],
                expected: FeedConfig::default()
                    .with_max_retries(5)
                    .with_timeout(Duration::from_millis(1500))
                    .with_poll_interval(Duration::from_millis(250))
                    .with_ws_url("ws://localhost:9443/ws"),
            },
            TestCase {
                // TC2: garbage falls back
                vars: vec![(ENV_MAX_RETRIES, "many"), (ENV_BUFFER_CAPACITY, "-1")],
                expected: FeedConfig::default(),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = FeedConfig::from_lookup(lookup(&test.vars)).unwrap();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_missing_provider_file_is_an_error() {
        let result = FeedConfig::from_lookup(lookup(&[(ENV_PROVIDERS, "/nonexistent/providers.json")]));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_parse_providers() {
        let providers = parse_providers(
            r#"[
                {"name": "okx", "type": "exchange", "baseEndpoint": "https://www.okx.com", "priority": 1},
                {"name": "kraken", "kind": "exchange", "baseUrl": "https://api.kraken.com", "priority": 2, "timeout": 3000, "enabled": false}
            ]"#,
        )
        .unwrap();

        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].timeout_ms, 15_000);
        assert_eq!(providers[1].timeout(), Duration::from_millis(3000));
        assert!(!providers[1].enabled);

        assert!(matches!(
            parse_providers(r#"[{"name": "okx", "type": "exchange", "baseEndpoint": "x", "priority": 1, "enabled": false}]"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(parse_providers("{"), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_derived_configs() {
        let config = FeedConfig::default()
            .with_max_retries(2)
            .with_rest_url("http://localhost:8080");

        let options = config.fetch_options();
        assert_eq!(options.max_retries, 2);
        assert_eq!(options.timeout, Some(Duration::from_millis(5000)));

        let backend = config.backend_config();
        assert_eq!(backend.rest_url, "http://localhost:8080");
        assert_eq!(backend.stream.url, "wss://stream.binance.com:9443/ws");

        let sync = config.sync_config("ETHUSDT", Period::Minute5);
        assert_eq!(sync.poll_interval, Duration::from_secs(2));
        assert_eq!(sync.buffer_capacity, 1000);
        assert_eq!(sync.period, Period::Minute5);
    }
}
