use crate::candle::{Candle, Period, PriceTick};
use std::collections::VecDeque;

/// Default maximum number of buffered candles.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Effect of merging a [`PriceTick`] into a [`CandleBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickMerge {
    /// Tick fell in the last candle's bucket and updated it in place.
    Updated,
    /// Tick opened a new bucket and was appended.
    Appended,
    /// Buffer has no candle to reconcile against.
    Empty,
    /// Tick carries neither `time` nor `timestamp`.
    MissingTime,
    /// Tick belongs to a bucket older than the last candle.
    Stale,
}

/// Rolling FIFO window of candles for the current selection.
///
/// Oldest candles are evicted once `capacity` is exceeded.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleBuffer {
    capacity: usize,
    candles: VecDeque<Candle>,
}

impl Default for CandleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl CandleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            candles: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.iter().copied().collect()
    }

    /// Replace the contents, keeping only the newest `capacity` candles.
    pub fn replace(&mut self, candles: impl IntoIterator<Item = Candle>) {
        self.candles.clear();
        for candle in candles {
            self.push(candle);
        }
    }

    /// Append a candle, evicting the oldest if at capacity.
    pub fn push(&mut self, candle: Candle) {
        if self.candles.len() >= self.capacity {
            self.candles.pop_front();
        }
        self.candles.push_back(candle);
    }

    pub fn clear(&mut self) {
        self.candles.clear();
    }

    /// Reconcile a tick against the last candle, bucketing by `period`.
    ///
    /// Same bucket: open, close and volume are taken from the tick while high
    /// and low keep their running extremes. Newer bucket: a candle stamped with
    /// the bucket start is appended.
    pub fn merge_tick(&mut self, tick: &PriceTick, period: Period) -> TickMerge {
        let Some(ts) = tick.event_time() else {
            return TickMerge::MissingTime;
        };
        let Some(last) = self.candles.back_mut() else {
            return TickMerge::Empty;
        };

        let bucket = period.bucket_start(ts);
        let last_bucket = period.bucket_start(last.time);

        if bucket == last_bucket {
            last.open = tick.open;
            last.close = tick.close;
            last.volume = tick.volume;
            last.high = last.high.max(tick.high);
            last.low = last.low.min(tick.low);
            TickMerge::Updated
        } else if bucket > last_bucket {
            self.push(tick.to_candle(bucket));
            TickMerge::Appended
        } else {
            TickMerge::Stale
        }
    }
}
