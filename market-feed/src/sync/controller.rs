use super::{
    SyncConfig,
    state::{LoadOutcome, LoadResult, LoadTicket, StreamSession, SyncSnapshot, SyncState, TickOutcome},
};
use crate::{
    backend::MarketBackend,
    candle::{Candle, Period, PriceTick, normalize_symbol},
    error::{BackendError, SyncError},
    indicator::IndicatorSnapshot,
    signal::Alert,
};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

struct Shared {
    backend: Arc<dyn MarketBackend>,
    config: SyncConfig,
    state: Mutex<SyncState>,
    updates: watch::Sender<SyncSnapshot>,
}

impl Shared {
    fn publish(&self, state: &SyncState) {
        self.updates.send_replace(state.snapshot());
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.abort_poll_task();
        if let Some(listener) = state.listener.take() {
            listener.abort();
        }
    }
}

/// Holds the single-flight slot for a running load. Dropped with the load
/// future, it releases the slot and spawns any follow-up that was queued.
struct LoadSlot {
    controller: SyncController,
    ticket: Option<LoadTicket>,
}

impl Drop for LoadSlot {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        let shared = &self.controller.shared;

        let follow_up = {
            let mut state = shared.state.lock();
            let follow_up = state.abandon_load(&ticket);
            shared.publish(&state);
            follow_up
        };
        debug!(
            symbol = %ticket.symbol,
            generation = ticket.generation,
            "load cancelled before completion"
        );

        let Some(next) = follow_up else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let controller = self.controller.clone();
                runtime.spawn(async move {
                    controller.run_load(next).await;
                });
            }
            Err(_) => {
                warn!(generation = next.generation, "no runtime for follow-up load, dropped");
                shared.state.lock().abandon_load(&next);
            }
        }
    }
}

/// Keeps a candle / indicator / alert view of one symbol and period in sync
/// with a [`MarketBackend`].
///
/// Cheap to clone; clones share state. Loads are single-flight and
/// generation-gated: a result is committed only if no newer load was requested
/// and the selection it was issued for is still current.
#[derive(Clone)]
pub struct SyncController {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncController")
            .field("config", &self.shared.config)
            .field("state", &*self.shared.state.lock())
            .finish()
    }
}

impl SyncController {
    pub fn new(backend: Arc<dyn MarketBackend>, config: SyncConfig) -> Self {
        let state = SyncState::new(config.symbol.clone(), config.period, config.buffer_capacity);
        let (updates, _) = watch::channel(state.snapshot());
        Self {
            shared: Arc::new(Shared {
                backend,
                config,
                state: Mutex::new(state),
                updates,
            }),
        }
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.shared.state.lock().snapshot()
    }

    /// Receiver observing a fresh [`SyncSnapshot`] after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.shared.updates.subscribe()
    }

    /// Refresh candles, indicators and alerts for the current selection.
    ///
    /// If a load is already running this returns [`LoadOutcome::Coalesced`]
    /// immediately and the running load is followed up once it completes.
    /// Dropping the returned future mid-read releases the single-flight slot;
    /// a follow-up requested meanwhile then runs on a spawned task.
    pub async fn load(&self) -> LoadOutcome {
        let ticket = {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                return LoadOutcome::Shutdown;
            }
            let ticket = state.begin_load();
            self.shared.publish(&state);
            ticket
        };
        match ticket {
            Some(ticket) => self.run_load(ticket).await,
            None => {
                debug!("load already in flight, coalesced");
                LoadOutcome::Coalesced
            }
        }
    }

    async fn run_load(&self, mut ticket: LoadTicket) -> LoadOutcome {
        let mut slot = LoadSlot {
            controller: self.clone(),
            ticket: Some(ticket.clone()),
        };

        loop {
            let result = self.read(&ticket).await;

            let (outcome, follow_up) = {
                let mut state = self.shared.state.lock();
                let finished = state.finish_load(&ticket, result);
                slot.ticket = finished.1.clone();
                self.shared.publish(&state);
                finished
            };

            match &outcome {
                LoadOutcome::Committed { candles } => debug!(
                    symbol = %ticket.symbol,
                    period = %ticket.period,
                    generation = ticket.generation,
                    candles,
                    "load committed"
                ),
                LoadOutcome::Preserved => debug!(
                    symbol = %ticket.symbol,
                    period = %ticket.period,
                    generation = ticket.generation,
                    "load returned no candles, buffer kept"
                ),
                LoadOutcome::Discarded => debug!(
                    symbol = %ticket.symbol,
                    period = %ticket.period,
                    generation = ticket.generation,
                    "stale load discarded"
                ),
                LoadOutcome::Failed(error) => error!(
                    symbol = %ticket.symbol,
                    period = %ticket.period,
                    generation = ticket.generation,
                    %error,
                    "load failed"
                ),
                LoadOutcome::Coalesced | LoadOutcome::Shutdown => {}
            }

            match follow_up {
                Some(next) => ticket = next,
                None => return outcome,
            }
        }
    }

    async fn read(&self, ticket: &LoadTicket) -> Result<LoadResult, BackendError> {
        let backend = &self.shared.backend;
        let (candles, indicators, alerts) = tokio::try_join!(
            backend.get_candles(&ticket.symbol, ticket.period),
            backend.get_indicators(&ticket.symbol, ticket.period),
            backend.get_alerts(&ticket.symbol, ticket.period),
        )?;

        Ok(LoadResult {
            candles,
            indicators,
            alerts,
        })
    }

    /// Flip streaming for the current selection. Returns the new streaming flag.
    ///
    /// Turning on starts the backend stream, requests a resync, arms the poll
    /// timer and loads once. If the selection changes while the stream is
    /// starting, no session is opened and `Ok(false)` is returned. Turning off clears local streaming state even when
    /// the backend fails to stop.
    pub async fn toggle_stream(&self) -> Result<bool, SyncError> {
        let (streaming, symbol, period) = {
            let state = self.shared.state.lock();
            if state.shut_down {
                return Err(SyncError::Shutdown);
            }
            (state.streaming, state.symbol.clone(), state.period)
        };

        if streaming {
            self.stop_streaming(symbol).await.map(|()| false)
        } else {
            self.start_streaming(symbol, period).await
        }
    }

    async fn start_streaming(&self, symbol: SmolStr, period: Period) -> Result<bool, SyncError> {
        self.shared
            .backend
            .start_stream(&symbol, period)
            .await
            .map_err(|source| {
                error!(%symbol, %period, %source, "failed to start stream");
                SyncError::StartStream {
                    symbol: symbol.to_string(),
                    source,
                }
            })?;

        if !self.open_started_session(&symbol, period).await? {
            return Ok(false);
        }
        info!(%symbol, %period, "streaming started");

        if let Err(error) = self
            .shared
            .backend
            .resync(&symbol, self.shared.config.resync_lookback)
            .await
        {
            warn!(%symbol, %error, "resync after stream start failed");
        }

        self.load().await;
        Ok(true)
    }

    /// Open a session once `start_stream(symbol, period)` has returned.
    ///
    /// Returns `Ok(false)` if the selection moved on during the await. The
    /// started stream is stopped after a shutdown, or when its symbol is no
    /// longer selected.
    async fn open_started_session(&self, symbol: &SmolStr, period: Period) -> Result<bool, SyncError> {
        let (opened, release) = {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                (Err(SyncError::Shutdown), true)
            } else if state.is_selected(symbol, period) {
                let session = state.open_session();
                self.arm_poll_timer(&mut state, session);
                self.shared.publish(&state);
                (Ok(true), false)
            } else {
                let release = normalize_symbol(symbol) != normalize_symbol(&state.symbol);
                (Ok(false), release)
            }
        };

        if !matches!(opened, Ok(true)) {
            debug!(%symbol, %period, release, "stream started for a superseded selection");
        }
        if release {
            self.stop_backend_stream(symbol).await;
        }
        opened
    }

    async fn stop_streaming(&self, symbol: SmolStr) -> Result<(), SyncError> {
        {
            let mut state = self.shared.state.lock();
            state.close_session();
            self.shared.publish(&state);
        }

        self.shared
            .backend
            .stop_stream(&symbol)
            .await
            .map_err(|source| {
                error!(%symbol, %source, "failed to stop stream");
                SyncError::StopStream {
                    symbol: symbol.to_string(),
                    source,
                }
            })?;

        info!(%symbol, "streaming stopped");
        Ok(())
    }

    async fn stop_backend_stream(&self, symbol: &str) {
        if let Err(error) = self.shared.backend.stop_stream(symbol).await {
            warn!(%symbol, %error, "failed to stop stream");
        }
    }

    /// Spawn the poll timer for `session`, replacing any previous timer.
    ///
    /// The timer re-checks its session on every tick and exits on mismatch.
    fn arm_poll_timer(&self, state: &mut SyncState, session: StreamSession) {
        state.abort_poll_task();

        let shared = Arc::downgrade(&self.shared);
        let every = self.shared.config.poll_interval.max(Duration::from_millis(1));
        let task = tokio::spawn(poll_timer(shared, session, every));
        state.poll_task = Some(task.abort_handle());
    }

    /// Change symbol and period together.
    ///
    /// Returns `Ok(None)` if the selection is unchanged. Otherwise the poll
    /// timer is cancelled, the stream restarted if it no longer matches, and a
    /// fresh load is awaited. A failed stream restart is returned after the load.
    pub async fn select(
        &self,
        symbol: impl Into<SmolStr>,
        period: Period,
    ) -> Result<Option<LoadOutcome>, SyncError> {
        let symbol = symbol.into();
        let change = {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                return Err(SyncError::Shutdown);
            }
            let Some(change) = state.select(symbol.clone(), period) else {
                return Ok(None);
            };
            state.abort_poll_task();
            self.shared.publish(&state);
            change
        };
        info!(from = %change.previous_symbol, to = %symbol, %period, "selection changed");

        let mut restart_error = None;
        if change.needs_restart(period) {
            if change.symbol_changed {
                self.stop_backend_stream(&change.previous_symbol).await;
            }

            match self.shared.backend.start_stream(&symbol, period).await {
                Ok(()) => {
                    self.open_started_session(&symbol, period).await?;
                }
                Err(source) => {
                    error!(%symbol, %period, %source, "failed to restart stream");
                    let mut state = self.shared.state.lock();
                    if state.is_selected(&symbol, period) {
                        state.close_session();
                        self.shared.publish(&state);
                    }
                    restart_error = Some(SyncError::StartStream {
                        symbol: symbol.to_string(),
                        source,
                    });
                }
            }
        } else if change.was_streaming {
            let mut state = self.shared.state.lock();
            let session = state.open_session();
            self.arm_poll_timer(&mut state, session);
        }

        if change.symbol_changed {
            let backend = Arc::clone(&self.shared.backend);
            let lookback = self.shared.config.resync_lookback;
            let symbol = symbol.clone();
            tokio::spawn(async move {
                if let Err(error) = backend.resync(&symbol, lookback).await {
                    warn!(%symbol, %error, "background resync failed");
                }
            });
        }

        let outcome = self.load().await;
        match restart_error {
            Some(error) => Err(error),
            None => Ok(Some(outcome)),
        }
    }

    pub async fn set_symbol(
        &self,
        symbol: impl Into<SmolStr>,
    ) -> Result<Option<LoadOutcome>, SyncError> {
        let period = self.shared.state.lock().period;
        self.select(symbol, period).await
    }

    pub async fn set_period(&self, period: Period) -> Result<Option<LoadOutcome>, SyncError> {
        let symbol = self.shared.state.lock().symbol.clone();
        self.select(symbol, period).await
    }

    /// Reconcile a push tick. A tick opening a new bucket triggers a load.
    pub async fn apply_tick(&self, tick: &PriceTick) -> TickOutcome {
        let outcome = {
            let mut state = self.shared.state.lock();
            let outcome = state.apply_tick(tick);
            if !matches!(outcome, TickOutcome::Ignored(_)) {
                self.shared.publish(&state);
            }
            outcome
        };

        match outcome {
            TickOutcome::Appended => {
                debug!(symbol = %tick.symbol, "tick opened a new candle");
                self.load().await;
            }
            TickOutcome::Ignored(reason) => {
                debug!(symbol = %tick.symbol, ?reason, "tick ignored");
            }
            TickOutcome::Updated => {}
        }
        outcome
    }

    /// Spawn a task feeding every tick of `ticks` into [`Self::apply_tick`],
    /// replacing any previous listener.
    pub fn listen<S>(&self, ticks: S)
    where
        S: Stream<Item = PriceTick> + Send + 'static,
    {
        let shared = Arc::downgrade(&self.shared);
        let task = tokio::spawn(async move {
            let mut ticks = std::pin::pin!(ticks);
            while let Some(tick) = ticks.next().await {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                SyncController { shared }.apply_tick(&tick).await;
            }
            debug!("tick listener finished");
        });

        let mut state = self.shared.state.lock();
        if let Some(previous) = state.listener.replace(task.abort_handle()) {
            previous.abort();
        }
    }

    /// Replace candles and alerts directly, superseding any in-flight load.
    ///
    /// Omitted indicators are reset to an empty snapshot.
    pub fn seed(
        &self,
        candles: Vec<Candle>,
        alerts: Vec<Alert>,
        indicators: Option<IndicatorSnapshot>,
    ) {
        if indicators.is_none() {
            warn!("seeding without indicators, snapshot reset to empty");
        }
        let mut state = self.shared.state.lock();
        state.seed(candles, alerts, indicators);
        self.shared.publish(&state);
    }

    /// Cancel the poll timer and tick listener and stop the stream if active.
    ///
    /// Every later control operation fails with [`SyncError::Shutdown`].
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        let (was_streaming, symbol) = {
            let mut state = self.shared.state.lock();
            state.shut_down = true;
            let was_streaming = state.streaming;
            state.close_session();
            if let Some(listener) = state.listener.take() {
                listener.abort();
            }
            self.shared.publish(&state);
            (was_streaming, state.symbol.clone())
        };

        info!(%symbol, was_streaming, "sync controller shut down");
        if was_streaming {
            self.shared
                .backend
                .stop_stream(&symbol)
                .await
                .map_err(|source| SyncError::StopStream {
                    symbol: symbol.to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}

async fn poll_timer(shared: Weak<Shared>, session: StreamSession, every: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(shared) = shared.upgrade() else {
            break;
        };
        let current = shared.state.lock().session_is_current(&session);
        if !current {
            debug!(session = session.id, symbol = %session.symbol, "poll timer session no longer current");
            break;
        }

        SyncController { shared }.load().await;
    }
}
