use crate::{
    candle::{Candle, Period},
    error::BackendError,
    indicator::IndicatorSnapshot,
    signal::Alert,
};
use async_trait::async_trait;

/// Binance spot REST and kline WebSocket implementation of [`MarketBackend`].
pub mod binance;

/// Reconnecting kline WebSocket task publishing [`PriceTick`](crate::candle::PriceTick)s.
pub mod stream;

pub use binance::{BinanceBackend, BinanceBackendConfig};
pub use stream::StreamConfig;

/// Computation service the [`SyncController`](crate::sync::SyncController) reads
/// candle, indicator and alert state from, and asks to manage push subscriptions.
///
/// Symbols are passed exactly as selected by the caller; implementations apply
/// their own naming.
#[async_trait]
pub trait MarketBackend: Send + Sync {
    async fn get_candles(&self, symbol: &str, period: Period) -> Result<Vec<Candle>, BackendError>;

    async fn get_indicators(
        &self,
        symbol: &str,
        period: Period,
    ) -> Result<IndicatorSnapshot, BackendError>;

    async fn get_alerts(&self, symbol: &str, period: Period) -> Result<Vec<Alert>, BackendError>;

    /// Start (or retarget) the push subscription for `symbol`.
    async fn start_stream(&self, symbol: &str, period: Period) -> Result<(), BackendError>;

    /// Stop the push subscription for `symbol`. Stopping an inactive symbol is
    /// not an error.
    async fn stop_stream(&self, symbol: &str) -> Result<(), BackendError>;

    /// Refresh the most recent `lookback` finest-period units for `symbol`.
    async fn resync(&self, symbol: &str, lookback: u32) -> Result<(), BackendError>;
}
