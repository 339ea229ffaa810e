//! Live Sync
//!
//! Keeps a candle / indicator / alert view of one Binance symbol in sync and
//! logs every change until interrupted.
//!
//! Usage:
//!   live-sync [SYMBOL] [--period 1m] [--no-stream]

use clap::Parser;
use market_feed::{
    FeedConfig, Period,
    backend::BinanceBackend,
    sync::{LoadPhase, SyncController, SyncSnapshot},
};
use market_feed_tools::{init_logging, parse_period};
use std::{process::ExitCode, sync::Arc};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "live-sync")]
#[command(about = "Follow live candles, indicators and alerts for a Binance symbol")]
struct Cli {
    #[arg(default_value = "BTCUSDT")]
    symbol: String,

    /// Candle period
    #[arg(long, default_value = "1m", value_parser = parse_period)]
    period: Period,

    /// Poll only, without the kline stream
    #[arg(long)]
    no_stream: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let config = match FeedConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let backend = Arc::new(BinanceBackend::new(config.backend_config()));
    let controller = SyncController::new(backend.clone(), config.sync_config(cli.symbol.as_str(), cli.period));
    controller.listen(backend.tick_stream());

    let mut updates = controller.subscribe();
    let outcome = controller.load().await;
    info!(symbol = %cli.symbol, period = %cli.period, ?outcome, "initial load");

    if !cli.no_stream {
        if let Err(error) = controller.toggle_stream().await {
            warn!(%error, "streaming unavailable, polling disabled");
        }
    }

    let mut last_alert = None;
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                log_snapshot(&snapshot, &mut last_alert);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
        }
    }

    match controller.shutdown().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "shutdown failed");
            ExitCode::FAILURE
        }
    }
}

fn log_snapshot(snapshot: &SyncSnapshot, last_alert: &mut Option<(i64, String)>) {
    if snapshot.phase == LoadPhase::Loading {
        return;
    }

    let last = snapshot.candles.last();
    let band = snapshot.indicators.latest_band();
    info!(
        symbol = %snapshot.symbol,
        period = %snapshot.period,
        phase = %snapshot.phase,
        generation = snapshot.load_generation,
        streaming = snapshot.streaming,
        candles = snapshot.candles.len(),
        close = ?last.map(|candle| candle.close),
        band_lower = ?band.map(|band| band.lower),
        band_upper = ?band.map(|band| band.upper),
        "state updated"
    );

    if let Some(alert) = &snapshot.latest_alert {
        let key = (alert.time, alert.kind.to_string());
        if last_alert.as_ref() != Some(&key) {
            info!(
                kind = %alert.kind,
                time = alert.time,
                price = alert.price,
                strength = ?alert.strength,
                bullish = alert.kind.is_bullish(),
                "new alert"
            );
            *last_alert = Some(key);
        }
    }
}
