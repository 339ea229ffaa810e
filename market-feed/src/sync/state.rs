use super::buffer::{CandleBuffer, TickMerge};
use crate::{
    candle::{Candle, Period, PriceTick, normalize_symbol},
    error::BackendError,
    indicator::IndicatorSnapshot,
    signal::{Alert, latest_alert},
};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tokio::task::AbortHandle;

/// Lifecycle of the most recent load for the current selection.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    #[default]
    #[display("idle")]
    Idle,
    #[display("loading")]
    Loading,
    #[display("loaded")]
    Loaded,
    #[display("stale_discarded")]
    StaleDiscarded,
    #[display("failed")]
    Failed,
}

/// Immutable identity of one streaming activation.
///
/// Poll timers capture the session they were armed for and stop as soon as it
/// is no longer the active one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamSession {
    pub id: u64,
    pub symbol: SmolStr,
    pub period: Period,
}

/// Selection captured when a load is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub generation: u64,
    pub symbol: SmolStr,
    pub period: Period,
}

/// The three backend reads a load commits.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadResult {
    pub candles: Vec<Candle>,
    pub indicators: IndicatorSnapshot,
    pub alerts: Vec<Alert>,
}

/// What happened to a load.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Non-empty candles replaced the buffer.
    Committed { candles: usize },
    /// Backend returned no candles; buffer kept, indicators and alerts updated.
    Preserved,
    /// Superseded by a newer generation or selection.
    Discarded,
    /// A read failed; state untouched.
    Failed(BackendError),
    /// Another load was in flight; it will be followed up at the latest generation.
    Coalesced,
    /// Controller has been shut down.
    Shutdown,
}

/// Reason a [`PriceTick`] did not touch the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickIgnored {
    Symbol,
    Period,
    StreamPeriod,
    EmptyBuffer,
    MissingTime,
    Stale,
}

/// Result of reconciling a [`PriceTick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Updated,
    Appended,
    Ignored(TickIgnored),
}

/// Read-only copy of controller state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub symbol: SmolStr,
    pub period: Period,
    pub candles: Vec<Candle>,
    pub indicators: IndicatorSnapshot,
    pub alerts: Vec<Alert>,
    pub latest_alert: Option<Alert>,
    pub streaming: bool,
    pub stream_period: Option<Period>,
    pub load_generation: u64,
    pub phase: LoadPhase,
}

/// Selection before a [`SyncState::select`] took effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    pub previous_symbol: SmolStr,
    pub symbol_changed: bool,
    pub was_streaming: bool,
    pub stream_period: Option<Period>,
}

impl SelectionChange {
    /// Whether the active stream no longer serves the new selection.
    pub fn needs_restart(&self, period: Period) -> bool {
        self.was_streaming && (self.symbol_changed || self.stream_period != Some(period))
    }
}

/// Controller state. Every transition is synchronous; the controller never
/// holds it across an `.await`.
#[derive(Debug)]
pub struct SyncState {
    pub(super) symbol: SmolStr,
    pub(super) period: Period,
    pub(super) candles: CandleBuffer,
    pub(super) indicators: IndicatorSnapshot,
    pub(super) alerts: Vec<Alert>,
    pub(super) latest_alert: Option<Alert>,
    pub(super) streaming: bool,
    pub(super) stream_period: Option<Period>,
    pub(super) generation: u64,
    pub(super) phase: LoadPhase,
    pub(super) session: Option<StreamSession>,
    pub(super) poll_task: Option<AbortHandle>,
    pub(super) listener: Option<AbortHandle>,
    pub(super) shut_down: bool,
    /// Generation of the load holding the single-flight slot.
    in_flight: Option<u64>,
    reload_pending: bool,
    next_session_id: u64,
}

impl SyncState {
    pub fn new(symbol: SmolStr, period: Period, capacity: usize) -> Self {
        Self {
            symbol,
            period,
            candles: CandleBuffer::new(capacity),
            indicators: IndicatorSnapshot::default(),
            alerts: Vec::new(),
            latest_alert: None,
            streaming: false,
            stream_period: None,
            generation: 0,
            phase: LoadPhase::Idle,
            session: None,
            poll_task: None,
            listener: None,
            shut_down: false,
            in_flight: None,
            reload_pending: false,
            next_session_id: 0,
        }
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            symbol: self.symbol.clone(),
            period: self.period,
            candles: self.candles.to_vec(),
            indicators: self.indicators.clone(),
            alerts: self.alerts.clone(),
            latest_alert: self.latest_alert.clone(),
            streaming: self.streaming,
            stream_period: self.stream_period,
            load_generation: self.generation,
            phase: self.phase,
        }
    }

    /// Allocate a new generation. Returns `None` when a load is already in
    /// flight, in which case a follow-up is queued for when it finishes.
    pub fn begin_load(&mut self) -> Option<LoadTicket> {
        if self.shut_down {
            return None;
        }

        self.generation += 1;
        if self.in_flight.is_some() {
            self.reload_pending = true;
            return None;
        }

        self.phase = LoadPhase::Loading;
        Some(self.claim())
    }

    fn claim(&mut self) -> LoadTicket {
        self.in_flight = Some(self.generation);
        self.ticket()
    }

    fn ticket(&self) -> LoadTicket {
        LoadTicket {
            generation: self.generation,
            symbol: self.symbol.clone(),
            period: self.period,
        }
    }

    /// Whether a result for `ticket` may still mutate state.
    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.generation == self.generation
            && ticket.symbol == self.symbol
            && ticket.period == self.period
    }

    /// Apply the result of the load for `ticket`, returning the follow-up
    /// ticket if another load was requested meanwhile.
    pub fn finish_load(
        &mut self,
        ticket: &LoadTicket,
        result: Result<LoadResult, BackendError>,
    ) -> (LoadOutcome, Option<LoadTicket>) {
        self.in_flight = None;

        let outcome = if !self.is_current(ticket) {
            self.phase = LoadPhase::StaleDiscarded;
            LoadOutcome::Discarded
        } else {
            match result {
                Ok(result) => self.commit(result),
                Err(error) => {
                    self.phase = LoadPhase::Failed;
                    LoadOutcome::Failed(error)
                }
            }
        };

        (outcome, self.follow_up())
    }

    /// Release the slot held by a load for `ticket` that was dropped before
    /// finishing. Returns the follow-up ticket if another load was requested
    /// meanwhile. A no-op unless `ticket` holds the slot.
    pub fn abandon_load(&mut self, ticket: &LoadTicket) -> Option<LoadTicket> {
        if self.in_flight != Some(ticket.generation) {
            return None;
        }

        self.in_flight = None;
        if self.phase == LoadPhase::Loading {
            self.phase = LoadPhase::StaleDiscarded;
        }
        self.follow_up()
    }

    fn follow_up(&mut self) -> Option<LoadTicket> {
        if std::mem::take(&mut self.reload_pending) && !self.shut_down {
            self.phase = LoadPhase::Loading;
            Some(self.claim())
        } else {
            None
        }
    }

    fn commit(&mut self, result: LoadResult) -> LoadOutcome {
        let LoadResult {
            candles,
            indicators,
            alerts,
        } = result;

        let outcome = if candles.is_empty() {
            LoadOutcome::Preserved
        } else {
            let count = candles.len();
            self.candles.replace(candles);
            LoadOutcome::Committed { candles: count }
        };

        self.indicators = indicators;
        self.latest_alert = latest_alert(&alerts);
        self.alerts = alerts;
        self.phase = LoadPhase::Loaded;
        outcome
    }

    /// Change the selection. Returns `None` if nothing changed.
    pub fn select(&mut self, symbol: SmolStr, period: Period) -> Option<SelectionChange> {
        let symbol_changed = normalize_symbol(&symbol) != normalize_symbol(&self.symbol);
        if !symbol_changed && period == self.period {
            return None;
        }

        let previous_symbol = std::mem::replace(&mut self.symbol, symbol);
        self.period = period;
        Some(SelectionChange {
            previous_symbol,
            symbol_changed,
            was_streaming: self.streaming,
            stream_period: self.stream_period,
        })
    }

    /// Whether `symbol` and `period` are still the selection.
    pub fn is_selected(&self, symbol: &str, period: Period) -> bool {
        symbol == self.symbol && period == self.period
    }

    /// Mark streaming active for the current selection.
    pub fn open_session(&mut self) -> StreamSession {
        self.next_session_id += 1;
        let session = StreamSession {
            id: self.next_session_id,
            symbol: self.symbol.clone(),
            period: self.period,
        };
        self.streaming = true;
        self.stream_period = Some(self.period);
        self.session = Some(session.clone());
        session
    }

    /// Clear every streaming marker and cancel the poll timer.
    pub fn close_session(&mut self) {
        self.streaming = false;
        self.stream_period = None;
        self.session = None;
        self.abort_poll_task();
    }

    pub fn abort_poll_task(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }

    /// Whether a timer armed for `session` should keep reloading.
    pub fn session_is_current(&self, session: &StreamSession) -> bool {
        !self.shut_down
            && self.streaming
            && self.session.as_ref() == Some(session)
            && session.symbol == self.symbol
            && session.period == self.period
    }

    /// Reconcile a push tick into the buffer.
    pub fn apply_tick(&mut self, tick: &PriceTick) -> TickOutcome {
        if normalize_symbol(&tick.symbol) != normalize_symbol(&self.symbol) {
            return TickOutcome::Ignored(TickIgnored::Symbol);
        }
        if !self.period.is_finest() {
            return TickOutcome::Ignored(TickIgnored::Period);
        }
        if self.streaming && self.stream_period != Some(Period::FINEST) {
            return TickOutcome::Ignored(TickIgnored::StreamPeriod);
        }

        match self.candles.merge_tick(tick, self.period) {
            TickMerge::Updated => TickOutcome::Updated,
            TickMerge::Appended => TickOutcome::Appended,
            TickMerge::Empty => TickOutcome::Ignored(TickIgnored::EmptyBuffer),
            TickMerge::MissingTime => TickOutcome::Ignored(TickIgnored::MissingTime),
            TickMerge::Stale => TickOutcome::Ignored(TickIgnored::Stale),
        }
    }

    /// Inject state directly, superseding any in-flight load.
    pub fn seed(
        &mut self,
        candles: Vec<Candle>,
        alerts: Vec<Alert>,
        indicators: Option<IndicatorSnapshot>,
    ) {
        self.generation += 1;
        self.candles.replace(candles);
        self.indicators = indicators.unwrap_or_default();
        self.latest_alert = latest_alert(&alerts);
        self.alerts = alerts;
        self.phase = LoadPhase::Loaded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::AlertKind;

    fn candle(time: i64, close: f64) -> Candle {
        Candle {
            time,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1.0,
        }
    }

    fn result(candles: Vec<Candle>, alert_close: Option<f64>) -> LoadResult {
        LoadResult {
            indicators: IndicatorSnapshot::compute(&candles),
            alerts: alert_close
                .map(|close| {
                    vec![Alert {
                        index: 0,
                        time: 0,
                        price: close,
                        close,
                        lower_band: None,
                        upper_band: None,
                        kind: AlertKind::BollingerDojiBottom,
                        strength: None,
                    }]
                })
                .unwrap_or_default(),
            candles,
        }
    }

    fn state() -> SyncState {
        SyncState::new("BTCUSDT".into(), Period::Minute1, 1000)
    }

    fn tick(symbol: &str, time: i64) -> PriceTick {
        PriceTick {
            symbol: symbol.into(),
            time: Some(time),
            timestamp: None,
            open: 100.0,
            high: 105.0,
            low: 95.0,
            close: 101.0,
            volume: 3.0,
        }
    }

    #[test]
    fn test_begin_load_is_single_flight() {
        let mut state = state();

        let first = state.begin_load().unwrap();
        assert_eq!(first.generation, 1);
        assert_eq!(state.phase, LoadPhase::Loading);

        assert_eq!(state.begin_load(), None);
        assert_eq!(state.generation, 2);

        let (outcome, follow_up) = state.finish_load(&first, Ok(result(vec![candle(0, 1.0)], None)));
        assert_eq!(outcome, LoadOutcome::Discarded);
        assert!(state.candles.is_empty());

        let follow_up = follow_up.unwrap();
        assert_eq!(follow_up.generation, 2);
        let (outcome, next) = state.finish_load(&follow_up, Ok(result(vec![candle(0, 2.0)], None)));
        assert_eq!(outcome, LoadOutcome::Committed { candles: 1 });
        assert_eq!(next, None);
        assert_eq!(state.candles.last().map(|c| c.close), Some(2.0));
        assert_eq!(state.phase, LoadPhase::Loaded);
    }

    #[test]
    fn test_abandoned_load_releases_slot() {
        let mut state = state();
        let ticket = state.begin_load().unwrap();

        // Nothing pending: slot freed
        assert_eq!(state.abandon_load(&ticket), None);
        assert_eq!(state.phase, LoadPhase::StaleDiscarded);
        let next = state.begin_load().unwrap();
        assert_eq!(next.generation, 2);

        // Stale ticket does not release the slot held by `next`
        assert_eq!(state.abandon_load(&ticket), None);
        assert_eq!(state.begin_load(), None);

        // Pending reload becomes the follow-up for the current selection
        state.symbol = "ETHUSDT".into();
        let follow_up = state.abandon_load(&next).unwrap();
        assert_eq!(follow_up.generation, 3);
        assert_eq!(follow_up.symbol, "ETHUSDT");
        assert_eq!(state.phase, LoadPhase::Loading);
        assert_eq!(state.begin_load(), None);

        let (outcome, next) = state.finish_load(&follow_up, Ok(result(vec![candle(0, 4.0)], None)));
        assert_eq!(outcome, LoadOutcome::Discarded);
        let next = next.unwrap();
        let (outcome, _) = state.finish_load(&next, Ok(result(vec![candle(0, 5.0)], None)));
        assert_eq!(outcome, LoadOutcome::Committed { candles: 1 });
    }

    #[test]
    fn test_finish_load_discards_on_selection_mismatch() {
        let mut state = state();
        let ticket = state.begin_load().unwrap();

        // Same generation, different selection
        state.symbol = "ETHUSDT".into();

        let (outcome, _) = state.finish_load(&ticket, Ok(result(vec![candle(0, 1.0)], Some(1.0))));
        assert_eq!(outcome, LoadOutcome::Discarded);
        assert_eq!(state.phase, LoadPhase::StaleDiscarded);
        assert!(state.candles.is_empty());
        assert!(state.alerts.is_empty());
    }

    #[test]
    fn test_finish_load_empty_candles_preserve_buffer() {
        let mut state = state();
        state.seed(vec![candle(0, 1.0), candle(60_000, 2.0)], Vec::new(), None);

        let ticket = state.begin_load().unwrap();
        let (outcome, _) = state.finish_load(&ticket, Ok(result(Vec::new(), Some(9.0))));

        assert_eq!(outcome, LoadOutcome::Preserved);
        assert_eq!(state.candles.len(), 2);
        assert_eq!(state.alerts.len(), 1);
        assert_eq!(state.latest_alert.as_ref().map(|a| a.close), Some(9.0));
    }

    #[test]
    fn test_finish_load_failure_keeps_state() {
        let mut state = state();
        state.seed(vec![candle(0, 1.0)], Vec::new(), None);

        let ticket = state.begin_load().unwrap();
        let (outcome, _) = state.finish_load(&ticket, Err(BackendError::Status(502)));

        assert_eq!(outcome, LoadOutcome::Failed(BackendError::Status(502)));
        assert_eq!(state.phase, LoadPhase::Failed);
        assert_eq!(state.candles.len(), 1);
    }

    #[test]
    fn test_apply_tick_guards() {
        struct TestCase {
            period: Period,
            stream_period: Option<Period>,
            tick: PriceTick,
            expected: TickOutcome,
        }

        let tests = vec![
            TestCase {
                // TC0: other symbol
                period: Period::Minute1,
                stream_period: None,
                tick: tick("ETHUSDT", 90_000),
                expected: TickOutcome::Ignored(TickIgnored::Symbol),
            },
            TestCase {
                // TC1: separators are normalised away
                period: Period::Minute1,
                stream_period: None,
                tick: tick("btc_usdt", 90_000),
                expected: TickOutcome::Updated,
            },
            TestCase {
                // TC2: coarse selection relies on polling
                period: Period::Minute5,
                stream_period: None,
                tick: tick("BTCUSDT", 90_000),
                expected: TickOutcome::Ignored(TickIgnored::Period),
            },
            TestCase {
                // TC3: streaming at a coarse period
                period: Period::Minute1,
                stream_period: Some(Period::Minute5),
                tick: tick("BTCUSDT", 90_000),
                expected: TickOutcome::Ignored(TickIgnored::StreamPeriod),
            },
            TestCase {
                // TC4: streaming at the finest period
                period: Period::Minute1,
                stream_period: Some(Period::Minute1),
                tick: tick("BTC-USDT", 120_000),
                expected: TickOutcome::Appended,
            },
            TestCase {
                // TC5: older bucket
                period: Period::Minute1,
                stream_period: None,
                tick: tick("BTCUSDT", 10_000),
                expected: TickOutcome::Ignored(TickIgnored::Stale),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let mut state = state();
            state.seed(vec![candle(0, 1.0), candle(60_000, 100.0)], Vec::new(), None);
            state.period = test.period;
            state.streaming = test.stream_period.is_some();
            state.stream_period = test.stream_period;

            let before = state.candles.to_vec();
            let actual = state.apply_tick(&test.tick);
            assert_eq!(actual, test.expected, "TC{} failed", index);
            if matches!(actual, TickOutcome::Ignored(_)) {
                assert_eq!(state.candles.to_vec(), before, "TC{} mutated", index);
            }
        }
    }

    #[test]
    fn test_apply_tick_same_bucket_takes_running_extremes() {
        let mut state = state();
        state.seed(
            vec![Candle {
                time: 60_000,
                open: 100.0,
                high: 110.0,
                low: 90.0,
                close: 100.0,
                volume: 1.0,
            }],
            Vec::new(),
            None,
        );

        assert_eq!(state.apply_tick(&tick("BTCUSDT", 90_000)), TickOutcome::Updated);
        assert_eq!(
            state.candles.last(),
            Some(&Candle {
                time: 60_000,
                open: 100.0,
                high: 110.0,
                low: 90.0,
                close: 101.0,
                volume: 3.0,
            })
        );
    }

    #[test]
    fn test_apply_tick_into_empty_buffer_is_ignored() {
        let mut state = state();
        assert_eq!(
            state.apply_tick(&tick("BTCUSDT", 0)),
            TickOutcome::Ignored(TickIgnored::EmptyBuffer)
        );
    }

    #[test]
    fn test_select() {
        let mut state = state();
        assert_eq!(state.select("btc_usdt".into(), Period::Minute1), None);

        state.open_session();
        let change = state.select("BTCUSDT".into(), Period::Minute5).unwrap();
        assert!(!change.symbol_changed);
        assert!(change.needs_restart(Period::Minute5));

        let change = state.select("ETHUSDT".into(), Period::Minute5).unwrap();
        assert!(change.symbol_changed);
        assert_eq!(change.previous_symbol, "BTCUSDT");
    }

    #[test]
    fn test_session_is_current() {
        let mut state = state();
        let session = state.open_session();
        assert!(state.session_is_current(&session));

        state.select("ETHUSDT".into(), Period::Minute1);
        assert!(!state.session_is_current(&session));

        let fresh = state.open_session();
        assert_ne!(fresh.id, session.id);
        assert!(state.session_is_current(&fresh));

        state.close_session();
        assert!(!state.session_is_current(&fresh));
        assert_eq!(state.stream_period, None);
    }

    #[test]
    fn test_seed_supersedes_in_flight_load() {
        let mut state = state();
        let ticket = state.begin_load().unwrap();

        let alerts = result(Vec::new(), Some(3.0)).alerts;
        state.seed((0..1200).map(|i| candle(i * 60_000, 1.0)).collect(), alerts, None);

        assert_eq!(state.candles.len(), 1000);
        assert_eq!(state.latest_alert.as_ref().map(|a| a.close), Some(3.0));
        assert_eq!(state.indicators, IndicatorSnapshot::default());

        let (outcome, _) = state.finish_load(&ticket, Ok(result(vec![candle(0, 7.0)], None)));
        assert_eq!(outcome, LoadOutcome::Discarded);
        assert_eq!(state.candles.len(), 1000);
    }
}
