use crate::candle::{Period, PriceTick};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::time::Duration;
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Kline WebSocket configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Raw stream endpoint, without the trailing stream name.
    pub url: String,
    /// Delay before reconnecting after a disconnect or failed connect.
    pub reconnect_delay: Duration,
    /// Capacity of the tick broadcast channel.
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "wss://stream.binance.com:9443/ws".to_string(),
            reconnect_delay: Duration::from_secs(2),
            channel_capacity: 1024,
        }
    }
}

impl StreamConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Full url of the `<symbol>@kline_<interval>` stream.
    pub fn kline_url(&self, symbol: &str, interval: Period) -> String {
        format!(
            "{}/{}@kline_{}",
            self.url.trim_end_matches('/'),
            symbol.to_lowercase(),
            interval.as_str()
        )
    }
}

/// Binance kline stream event.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams#klinecandlestick-streams-for-utc>
///
/// ### Raw Payload Example
/// ```json
/// {
///   "e": "kline", "E": 1700000030000, "s": "BTCUSDT",
///   "k": {"t": 1700000000000, "T": 1700000059999, "s": "BTCUSDT", "i": "1m",
///         "o": "37000.1", "c": "37010.0", "h": "37020.5", "l": "36990.0",
///         "v": "12.5", "x": false}
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceKlineEvent {
    #[serde(rename = "s")]
    pub symbol: SmolStr,
    #[serde(rename = "k")]
    pub kline: BinanceKlineData,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceKlineData {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "x", default)]
    pub closed: bool,
}

impl BinanceKlineEvent {
    /// Convert to a [`PriceTick`] stamped with the kline open time. Returns
    /// `None` if any price field fails to parse.
    pub fn to_tick(&self) -> Option<PriceTick> {
        let k = &self.kline;
        Some(PriceTick {
            symbol: self.symbol.clone(),
            time: Some(k.open_time),
            timestamp: None,
            open: k.open.parse().ok()?,
            high: k.high.parse().ok()?,
            low: k.low.parse().ok()?,
            close: k.close.parse().ok()?,
            volume: k.volume.parse().ok()?,
        })
    }
}

/// Spawn a task streaming `symbol` klines at `interval` into `tx`, reconnecting
/// forever until aborted.
pub fn spawn_kline_stream(
    config: StreamConfig,
    symbol: SmolStr,
    interval: Period,
    tx: broadcast::Sender<PriceTick>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let url = config.kline_url(&symbol, interval);
        info!(%symbol, %interval, %url, "starting kline stream");

        loop {
            match connect_async(url.as_str()).await {
                Ok((ws_stream, _)) => {
                    info!(%symbol, %interval, "kline stream connected");
                    let (_, mut read) = ws_stream.split();

                    while let Some(msg) = read.next().await {
                        match msg {
                            Ok(Message::Text(text)) => {
                                match serde_json::from_str::<BinanceKlineEvent>(&text) {
                                    Ok(event) => match event.to_tick() {
                                        Some(tick) => {
                                            // No subscribers is fine; ticks are dropped
                                            let _ = tx.send(tick);
                                        }
                                        None => debug!(%symbol, "kline with unparseable prices"),
                                    },
                                    Err(e) => {
                                        debug!(
                                            "Failed to parse kline message: {} - {}",
                                            e,
                                            text.chars().take(100).collect::<String>()
                                        );
                                    }
                                }
                            }
                            Ok(Message::Close(_)) => {
                                warn!(%symbol, "kline stream closed by server");
                                break;
                            }
                            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                                // Heartbeat - handled automatically
                            }
                            Err(e) => {
                                error!(%symbol, "kline stream error: {}", e);
                                break;
                            }
                            _ => {}
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to connect to {}: {}", url, e);
                }
            }

            debug!(
                "Waiting {:?} before reconnecting kline stream...",
                config.reconnect_delay
            );
            tokio::time::sleep(config.reconnect_delay).await;
        }
    })
}
