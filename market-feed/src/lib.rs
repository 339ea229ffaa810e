//! # Market Feed
//! Resilient acquisition of live cryptocurrency market data and a client-side
//! candle / indicator / alert view kept in sync with a backend.
//!
//! The library includes:
//! - [`fetch`]: multi-provider price fetcher with priority failover, concurrent
//!   fan-out and health probes over the adapters in [`provider`].
//! - [`indicator`] and [`signal`]: pure Bollinger band, moving average, MACD and
//!   candle pattern alert computation.
//! - [`backend`]: the [`MarketBackend`] contract plus a Binance spot
//!   implementation with kline streaming.
//! - [`sync`]: the [`SyncController`], a generation-gated, single-flight view of
//!   one symbol and period with streaming, polling and push-tick reconciliation.
//!
//! ## Example
//! ```rust,no_run
//! use market_feed::{
//!     backend::{BinanceBackend, BinanceBackendConfig},
//!     candle::Period,
//!     sync::{SyncConfig, SyncController},
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = Arc::new(BinanceBackend::new(BinanceBackendConfig::default()));
//!     let controller = SyncController::new(backend.clone(), SyncConfig::new("BTCUSDT", Period::Minute1));
//!     controller.listen(backend.tick_stream());
//!
//!     controller.load().await;
//!     controller.toggle_stream().await.ok();
//!
//!     let mut updates = controller.subscribe();
//!     while updates.changed().await.is_ok() {
//!         let snapshot = updates.borrow_and_update().clone();
//!         println!("{} candles, latest alert {:?}", snapshot.candles.len(), snapshot.latest_alert);
//!     }
//! }
//! ```

/// Candle, period and push-tick data model.
pub mod candle;

/// Indicator series computed over candle sequences.
pub mod indicator;

/// Candle pattern predicates and band-relative alerts.
pub mod signal;

/// Upstream price providers and their adapters.
pub mod provider;

/// Failover, fan-out and health-check price fetching.
pub mod fetch;

/// Backend computation service contract and the Binance implementation.
pub mod backend;

/// Live synchronisation controller.
pub mod sync;

/// Environment driven configuration.
pub mod config;

/// All [`Error`](std::error::Error)s generated in Market Feed.
pub mod error;

pub use backend::MarketBackend;
pub use candle::{Candle, Period, PriceTick};
pub use config::FeedConfig;
pub use fetch::{FetchOptions, PriceFetcher};
pub use signal::{Alert, AlertKind};
pub use sync::{SyncController, SyncSnapshot};
