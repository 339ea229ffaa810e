use super::{
    MarketBackend,
    stream::{StreamConfig, spawn_kline_stream},
};
use crate::{
    candle::{Candle, Period, PriceTick, normalize_symbol},
    error::BackendError,
    indicator::IndicatorSnapshot,
    signal::{Alert, detect_all_signals},
};
use async_trait::async_trait;
use fnv::FnvHashMap;
use futures::Stream;
use itertools::Itertools;
use parking_lot::Mutex;
use serde::Deserialize;
use smol_str::SmolStr;
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tracing::{debug, info, warn};
use url::Url;

/// Maximum klines Binance returns per request.
const MAX_KLINE_LIMIT: usize = 1000;

/// [`BinanceBackend`] configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinanceBackendConfig {
    /// Spot REST base, eg/ `https://api.binance.com`.
    pub rest_url: String,
    pub stream: StreamConfig,
    /// How long a fetched series is served from cache.
    pub cache_ttl: Duration,
    /// Klines requested per series.
    pub kline_limit: usize,
    pub request_timeout: Duration,
}

impl Default for BinanceBackendConfig {
    fn default() -> Self {
        Self {
            rest_url: "https://api.binance.com".to_string(),
            stream: StreamConfig::default(),
            cache_ttl: Duration::from_secs(1),
            kline_limit: MAX_KLINE_LIMIT,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl BinanceBackendConfig {
    pub fn with_rest_url(mut self, url: impl Into<String>) -> Self {
        self.rest_url = url.into();
        self
    }

    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_kline_limit(mut self, limit: usize) -> Self {
        self.kline_limit = limit.clamp(1, MAX_KLINE_LIMIT);
        self
    }
}

/// Binance kline REST response row.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/rest-api/market-data-endpoints#klinecandlestick-data>
#[derive(Debug, Deserialize)]
struct BinanceKline(
    i64,    // 0: Open time
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time
    String, // 7: Quote asset volume
    i64,    // 8: Number of trades
    String, // 9: Taker buy base asset volume
    String, // 10: Taker buy quote asset volume
    String, // 11: Ignore
);

impl BinanceKline {
    fn to_candle(&self) -> Option<Candle> {
        Some(Candle {
            time: self.0,
            open: self.1.parse().ok()?,
            high: self.2.parse().ok()?,
            low: self.3.parse().ok()?,
            close: self.4.parse().ok()?,
            volume: self.5.parse().ok()?,
        })
    }
}

/// Binance has no native 3h interval; it is resampled from 1h.
fn native_interval(period: Period) -> Period {
    match period {
        Period::Hour3 => Period::Hour1,
        other => other,
    }
}

/// Merge `source` candles into `target` buckets. `source` must be sorted by time.
fn resample(source: &[Candle], target: Period) -> Vec<Candle> {
    source
        .iter()
        .chunk_by(|candle| target.bucket_start(candle.time))
        .into_iter()
        .filter_map(|(bucket, mut group)| {
            let first = *group.next()?;
            Some(group.fold(
                Candle {
                    time: bucket,
                    ..first
                },
                |acc, candle| Candle {
                    high: acc.high.max(candle.high),
                    low: acc.low.min(candle.low),
                    close: candle.close,
                    volume: acc.volume + candle.volume,
                    ..acc
                },
            ))
        })
        .collect()
}

/// Overwrite candles sharing an open time and append newer ones, keeping the
/// newest `limit`.
fn merge_candles(existing: &mut Vec<Candle>, fresh: impl IntoIterator<Item = Candle>, limit: usize) {
    for candle in fresh {
        match existing.binary_search_by_key(&candle.time, |c| c.time) {
            Ok(index) => existing[index] = candle,
            Err(index) => existing.insert(index, candle),
        }
    }
    if existing.len() > limit {
        existing.drain(..existing.len() - limit);
    }
}

#[derive(Debug, Clone)]
struct CachedSeries {
    candles: Vec<Candle>,
    fetched_at: Instant,
}

type SeriesKey = (SmolStr, Period);

#[derive(Debug)]
struct StreamSlot {
    period: Period,
    task: JoinHandle<()>,
}

/// [`MarketBackend`] computing indicators and alerts locally from Binance spot
/// klines.
///
/// Push ticks from active streams are available via [`BinanceBackend::tick_stream`].
#[derive(Debug)]
pub struct BinanceBackend {
    config: BinanceBackendConfig,
    client: reqwest::Client,
    cache: Mutex<FnvHashMap<SeriesKey, CachedSeries>>,
    /// Serialises fetches per series so concurrent readers share one response.
    fetching: Mutex<FnvHashMap<SeriesKey, Arc<tokio::sync::Mutex<()>>>>,
    streams: Mutex<FnvHashMap<SmolStr, StreamSlot>>,
    ticks: broadcast::Sender<PriceTick>,
}

impl BinanceBackend {
    pub fn new(config: BinanceBackendConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: BinanceBackendConfig, client: reqwest::Client) -> Self {
        let (ticks, _) = broadcast::channel(config.stream.channel_capacity.max(1));
        Self {
            config,
            client,
            cache: Mutex::new(FnvHashMap::default()),
            fetching: Mutex::new(FnvHashMap::default()),
            streams: Mutex::new(FnvHashMap::default()),
            ticks,
        }
    }

    /// Ticks from every active stream. Lagged ticks are skipped.
    pub fn tick_stream(&self) -> impl Stream<Item = PriceTick> + Send + 'static {
        BroadcastStream::new(self.ticks.subscribe()).filter_map(Result::ok)
    }

    /// Symbols with an active stream and the period each streams at.
    pub fn active_streams(&self) -> Vec<(SmolStr, Period)> {
        self.streams
            .lock()
            .iter()
            .map(|(symbol, slot)| (symbol.clone(), slot.period))
            .sorted()
            .collect()
    }

    fn klines_url(&self, symbol: &str, interval: Period, limit: usize) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.config.rest_url)?.join("/api/v3/klines")?;
        url.query_pairs_mut()
            .append_pair("symbol", symbol)
            .append_pair("interval", interval.as_str())
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        interval: Period,
        limit: usize,
    ) -> Result<Vec<Candle>, BackendError> {
        let url = self.klines_url(symbol, interval, limit)?;
        let response = self
            .client
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::Status(response.status().as_u16()));
        }

        let klines: Vec<BinanceKline> = response.json().await?;
        Ok(klines.iter().filter_map(BinanceKline::to_candle).collect())
    }

    fn cached(&self, key: &SeriesKey) -> Option<Vec<Candle>> {
        self.cache
            .lock()
            .get(key)
            .filter(|cached| cached.fetched_at.elapsed() < self.config.cache_ttl)
            .map(|cached| cached.candles.clone())
    }

    /// Candle series for `(symbol, period)`, served from cache while fresh.
    ///
    /// At most one fetch per series runs at a time; readers arriving while it
    /// is in flight wait for it and are served the same candles.
    async fn series(&self, symbol: &str, period: Period) -> Result<Vec<Candle>, BackendError> {
        let symbol = normalize_symbol(symbol);
        let key = (symbol.clone(), period);

        if let Some(candles) = self.cached(&key) {
            return Ok(candles);
        }

        let fetch_lock = Arc::clone(self.fetching.lock().entry(key.clone()).or_default());
        let _fetching = fetch_lock.lock().await;
        if let Some(candles) = self.cached(&key) {
            return Ok(candles);
        }

        let interval = native_interval(period);
        let candles = if interval == period {
            self.fetch_klines(&symbol, period, self.config.kline_limit)
                .await?
        } else {
            let ratio = (period.minutes() / interval.minutes()).max(1) as usize;
            let raw = self
                .fetch_klines(&symbol, interval, MAX_KLINE_LIMIT)
                .await?;
            let mut resampled = resample(&raw, period);
            let keep = (MAX_KLINE_LIMIT / ratio).min(self.config.kline_limit);
            if resampled.len() > keep {
                resampled.drain(..resampled.len() - keep);
            }
            resampled
        };

        debug!(%symbol, %period, candles = candles.len(), "fetched kline series");
        self.cache.lock().insert(
            key,
            CachedSeries {
                candles: candles.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(candles)
    }
}

#[async_trait]
impl MarketBackend for BinanceBackend {
    async fn get_candles(&self, symbol: &str, period: Period) -> Result<Vec<Candle>, BackendError> {
        self.series(symbol, period).await
    }

    async fn get_indicators(
        &self,
        symbol: &str,
        period: Period,
    ) -> Result<IndicatorSnapshot, BackendError> {
        let candles = self.series(symbol, period).await?;
        Ok(IndicatorSnapshot::compute(&candles))
    }

    async fn get_alerts(&self, symbol: &str, period: Period) -> Result<Vec<Alert>, BackendError> {
        let candles = self.series(symbol, period).await?;
        Ok(detect_all_signals(&candles))
    }

    async fn start_stream(&self, symbol: &str, period: Period) -> Result<(), BackendError> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(BackendError::Stream("empty symbol".to_string()));
        }

        let mut streams = self.streams.lock();
        if let Some(slot) = streams.get(&symbol) {
            if slot.period == period && !slot.task.is_finished() {
                debug!(%symbol, %period, "stream already active");
                return Ok(());
            }
        }

        let task = spawn_kline_stream(
            self.config.stream.clone(),
            symbol.clone(),
            native_interval(period),
            self.ticks.clone(),
        );
        if let Some(previous) = streams.insert(symbol.clone(), StreamSlot { period, task }) {
            previous.task.abort();
            info!(%symbol, from = %previous.period, to = %period, "stream retargeted");
        } else {
            info!(%symbol, %period, "stream started");
        }
        Ok(())
    }

    async fn stop_stream(&self, symbol: &str) -> Result<(), BackendError> {
        let symbol = normalize_symbol(symbol);
        match self.streams.lock().remove(&symbol) {
            Some(slot) => {
                slot.task.abort();
                info!(%symbol, period = %slot.period, "stream stopped");
            }
            None => debug!(%symbol, "stop requested for inactive stream"),
        }
        Ok(())
    }

    async fn resync(&self, symbol: &str, lookback: u32) -> Result<(), BackendError> {
        let symbol = normalize_symbol(symbol);
        let limit = (lookback.max(1) as usize + 1).min(MAX_KLINE_LIMIT);
        let fresh = self.fetch_klines(&symbol, Period::FINEST, limit).await?;

        let mut cache = self.cache.lock();
        if let Some(series) = cache.get_mut(&(symbol.clone(), Period::FINEST)) {
            merge_candles(&mut series.candles, fresh, self.config.kline_limit);
            series.fetched_at = Instant::now();
        }
        // Coarser series are rebuilt on next read
        cache.retain(|(cached, period), _| *cached != symbol || period.is_finest());

        debug!(%symbol, lookback, "resynced");
        Ok(())
    }
}

impl Drop for BinanceBackend {
    fn drop(&mut self) {
        for (symbol, slot) in self.streams.get_mut().drain() {
            warn!(%symbol, "aborting stream on backend drop");
            slot.task.abort();
        }
    }
}
