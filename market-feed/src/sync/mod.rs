use crate::candle::Period;
use smol_str::SmolStr;
use std::time::Duration;

/// Bounded FIFO candle window with push-tick reconciliation.
pub mod buffer;

/// Synchronous controller state transitions.
pub mod state;

/// Async orchestration of loads, streaming and the poll timer.
pub mod controller;

pub use buffer::{CandleBuffer, DEFAULT_BUFFER_CAPACITY};
pub use controller::SyncController;
pub use state::{
    LoadOutcome, LoadPhase, StreamSession, SyncSnapshot, TickIgnored, TickOutcome,
};

/// [`SyncController`] configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Initial selection.
    pub symbol: SmolStr,
    pub period: Period,
    /// Reload cadence while streaming.
    pub poll_interval: Duration,
    pub buffer_capacity: usize,
    /// Finest-period units requested from the backend on resync.
    pub resync_lookback: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            symbol: SmolStr::new_static("BTCUSDT"),
            period: Period::Minute1,
            poll_interval: Duration::from_secs(2),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            resync_lookback: 1,
        }
    }
}

impl SyncConfig {
    pub fn new(symbol: impl Into<SmolStr>, period: Period) -> Self {
        Self {
            symbol: symbol.into(),
            period,
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_resync_lookback(mut self, lookback: u32) -> Self {
        self.resync_lookback = lookback;
        self
    }
}
