//! Tickflow market-data engine
//!
//! Runs the engine over a recorded event file, or validates a configuration.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tickflow::{
    config::Config,
    engine::{Engine, EngineConfig},
    provider::ReplayProvider,
    types::Side,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tickflow")]
#[command(about = "Real-time market-data processing engine for algorithmic trading")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines event file through the engine
    Replay {
        /// Event file, one market event per line
        #[arg(short, long)]
        events: PathBuf,

        /// Provider id the replay is registered under
        #[arg(long, default_value = "replay")]
        provider: String,

        /// Delay between replayed events in milliseconds
        #[arg(long, default_value = "0")]
        pace_ms: u64,
    },
    /// Validate the configuration file and print a summary
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Replay {
            events,
            provider,
            pace_ms,
        } => run_replay(config, events, &provider, pace_ms).await,
        Commands::CheckConfig => check_config(&config),
    }
}

async fn run_replay(config: Config, events: PathBuf, provider_id: &str, pace_ms: u64) -> anyhow::Result<()> {
    tracing::info!(events = %events.display(), "Starting replay");

    let engine = Engine::new(EngineConfig::from(&config.engine));

    let mut replay = ReplayProvider::new(provider_id, &events);
    if pace_ms > 0 {
        replay = replay.with_pace(Duration::from_millis(pace_ms));
    }
    let replay = Arc::new(replay);
    engine.engage_provider(replay.clone())?;
    engine.apply_config(&config)?;

    // Without explicit subscriptions, replay every symbol that has a strategy
    if config.subscriptions.is_empty() {
        for binding in &config.strategies {
            engine.add_initial_subscription(provider_id, &binding.symbol)?;
        }
    }

    let mut decisions = engine
        .take_decisions()
        .ok_or_else(|| anyhow::anyhow!("decision stream already taken"))?;
    let buys = Arc::new(AtomicUsize::new(0));
    let sells = Arc::new(AtomicUsize::new(0));
    let counter = {
        let (buys, sells) = (buys.clone(), sells.clone());
        tokio::spawn(async move {
            while let Some(decision) = decisions.recv().await {
                match decision.side {
                    Side::Buy => buys.fetch_add(1, Ordering::Relaxed),
                    Side::Sell => sells.fetch_add(1, Ordering::Relaxed),
                };
            }
        })
    };

    engine.turn_on().await?;

    tokio::select! {
        _ = replay.wait_until_exhausted() => {
            tracing::info!("Replay exhausted");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    let report = engine.turn_off().await?;
    counter.abort();

    println!("Processed events:  {}", report.processed_events);
    println!("Failed events:     {}", report.failed_events);
    println!("Subscriptions:     {} cancelled", report.cancelled_subscriptions);
    println!(
        "Decisions:         {} buy, {} sell",
        buys.load(Ordering::Relaxed),
        sells.load(Ordering::Relaxed)
    );
    for symbol in engine.statistics().symbols() {
        let last = engine
            .cache()
            .last_ticker(&symbol)
            .map(|t| t.last_price)
            .unwrap_or_default();
        println!(
            "  {:<12} last {:>14.4}  window {}",
            symbol,
            last,
            engine.statistics().window_len(&symbol)
        );
    }
    for worker in engine.workers() {
        println!(
            "  worker {:>2}  {:?}  processed {}  failed {}",
            worker.id, worker.state, worker.processed, worker.failed
        );
    }

    Ok(())
}

fn check_config(config: &Config) -> anyhow::Result<()> {
    println!("Configuration OK");
    println!("  exchange:      {:?}", config.exchange);
    println!("  storage:       {:?}", config.storage);
    println!("  api port:      {}", config.api.port);
    println!(
        "  engine:        {} workers, queue {}",
        config.engine.workers, config.engine.queue_capacity
    );
    println!("  buckets:       {:?}", config.statistics.bucket_sizes);
    println!("  calculations:  {:?}", config.statistics.calculations);
    for binding in &config.strategies {
        println!(
            "  strategy:      {} {:?} {}/{}/{} on {}",
            binding.symbol, binding.mode, binding.short, binding.mid, binding.long, binding.calculation
        );
    }
    for sub in &config.subscriptions {
        println!("  subscription:  {} @ {}", sub.stream, sub.provider);
    }
    Ok(())
}
