/// Market Feed Tools - Shared Library
///
/// Common setup for the diagnostic binaries:
/// - price-probe: failover, fan-out and health checks against the price providers
/// - live-sync: a live candle / indicator / alert view against Binance
use clap::ValueEnum;
use market_feed::Period;

/// Initialise `tracing` from `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Parse a candle period argument (`1m`, `4h`, `1M`, ...).
pub fn parse_period(raw: &str) -> Result<Period, String> {
    raw.parse::<Period>().map_err(|error| error.to_string())
}

/// How reports are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
