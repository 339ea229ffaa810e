//! Price Probe
//!
//! Usage:
//!   price-probe failover <symbol> [--retries N] [--timeout-ms MS] [--provider NAME]...
//!   price-probe fanout <symbol> [--timeout-ms MS] [--provider NAME]...
//!   price-probe health [symbol]

use clap::{Parser, Subcommand};
use market_feed::{
    FeedConfig, PriceFetcher,
    fetch::{AttemptOutcome, FailoverReport, FanOutReport, FetchOptions, ProviderHealth},
};
use market_feed_tools::{OutputFormat, init_logging};
use serde::Serialize;
use std::{process::ExitCode, time::Duration};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "price-probe")]
#[command(about = "Query upstream crypto price providers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Try providers in priority order until one answers
    Failover {
        /// Symbol or alias, eg/ BTCUSDT, btc, ethereum
        symbol: String,

        /// Attempts per provider
        #[arg(long)]
        retries: Option<u32>,

        /// Per-read timeout
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Restrict to these providers
        #[arg(long = "provider")]
        providers: Vec<String>,
    },

    /// Query every provider at once and compare
    Fanout {
        symbol: String,

        #[arg(long)]
        timeout_ms: Option<u64>,

        #[arg(long = "provider")]
        providers: Vec<String>,
    },

    /// Probe every provider once
    Health {
        #[arg(default_value = "BTCUSDT")]
        symbol: String,
    },
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

    let fetcher = PriceFetcher::from_descriptors(config.providers.clone(), &reqwest::Client::new());
    info!(providers = ?fetcher.providers().map(|p| p.name.as_str()).collect::<Vec<_>>(), "price providers");

    let result = match cli.command {
        Commands::Failover {
            symbol,
            retries,
            timeout_ms,
            providers,
        } => {
            let options = options(&config, retries, timeout_ms, providers);
            fetcher
                .fetch_failover(&symbol, &options)
                .await
                .map(|report| {
                    let success = report.is_success();
                    print_report(cli.format, &report, print_failover);
                    success
                })
        }
        Commands::Fanout {
            symbol,
            timeout_ms,
            providers,
        } => {
            let options = options(&config, None, timeout_ms, providers);
            fetcher.fetch_all(&symbol, &options).await.map(|report| {
                let success = report.successful > 0;
                print_report(cli.format, &report, print_fanout);
                success
            })
        }
        Commands::Health { symbol } => fetcher.health_check(&symbol).await.map(|report| {
            let success = report.iter().any(|health| health.available);
            print_report(cli.format, &report, |report| print_health(report));
            success
        }),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(error) => {
            error!(%error, "price probe failed");
            ExitCode::FAILURE
        }
    }
}

fn options(
    config: &FeedConfig,
    retries: Option<u32>,
    timeout_ms: Option<u64>,
    providers: Vec<String>,
) -> FetchOptions {
    let mut options = config.fetch_options();
    if let Some(retries) = retries {
        options = options.with_max_retries(retries);
    }
    if let Some(timeout_ms) = timeout_ms {
        options = options.with_timeout(Duration::from_millis(timeout_ms));
    }
    if !providers.is_empty() {
        options = options.with_allowed_providers(providers);
    }
    options
}

fn print_report<T: Serialize + ?Sized>(format: OutputFormat, report: &T, text: impl Fn(&T)) {
    match format {
        OutputFormat::Text => text(report),
        OutputFormat::Json => match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{json}"),
            Err(error) => error!(%error, "failed to serialise report"),
        },
    }
}

fn print_failover(report: &FailoverReport) {
    for attempt in &report.attempts {
        let marker = match attempt.outcome {
            AttemptOutcome::Success => "ok  ",
            AttemptOutcome::Failure => "fail",
        };
        println!(
            "{marker} {:<10} try {} {:>6}ms {}",
            attempt.source,
            attempt.retry_index + 1,
            attempt.elapsed_ms,
            attempt.error.as_deref().unwrap_or("")
        );
    }
    match &report.quote {
        Some(quote) => println!("{} = {} (via {})", report.symbol, quote.price, quote.source),
        None => println!("{}: every provider failed", report.symbol),
    }
}

fn print_fanout(report: &FanOutReport) {
    for result in &report.results {
        match (result.price, &result.error) {
            (Some(price), _) => println!("ok   {:<10} {:>14} {:>6}ms", result.source, price, result.elapsed_ms),
            (None, error) => println!(
                "fail {:<10} {:>14} {:>6}ms {}",
                result.source,
                "-",
                result.elapsed_ms,
                error.as_deref().unwrap_or("")
            ),
        }
    }
    println!(
        "{}: {}/{} providers answered",
        report.symbol, report.successful, report.total
    );
    if let (Some(average), Some(range)) = (report.average_price, &report.price_range) {
        println!(
            "average {average}, min {} ({}), max {} ({}), spread {}",
            range.min,
            range.min_source,
            range.max,
            range.max_source,
            range.spread()
        );
    }
}

fn print_health(report: &[ProviderHealth]) {
    for health in report {
        let status = if health.available { "up  " } else { "down" };
        println!(
            "{status} {:<10} {:<10} {:>6}ms {}",
            health.name,
            health.kind,
            health.elapsed_ms,
            health
                .price
                .map(|price| price.to_string())
                .or_else(|| health.error.clone())
                .unwrap_or_default()
        );
    }
}
