use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use tracktrade_core::config::AppConfig;
use tracktrade_core::traits::{AdmissionGate, Notifier, OpenGate};
use tracktrade_core::ConfigLoader;
use tracktrade_engine::{BlacklistGate, LadderSettings, StoreActor, TradeEngine};
use tracktrade_kucoin::KucoinClient;
use tracktrade_notify::{NullNotifier, TelegramNotifier};

#[derive(Parser)]
#[command(name = "tracktrade")]
#[command(about = "Track/slot ladder trading bot for KuCoin spot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine: recovery, monitors, and the periodic sweep.
    ///
    /// Signals are fed in by the operator's command channel; this process
    /// keeps positions monitored until shutdown.
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Print the current ladder state and counters.
    Status {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => run(&config).await,
        Commands::Status { config } => status(&config).await,
    }
}

fn build_engine(config: &AppConfig) -> Result<TradeEngine> {
    let exchange =
        Arc::new(KucoinClient::from_config(&config.kucoin).context("KuCoin client setup failed")?);

    let notifier: Arc<dyn Notifier> = match &config.telegram {
        Some(telegram) => Arc::new(TelegramNotifier::spawn(telegram.clone())),
        None => {
            info!("telegram not configured; notifications disabled");
            Arc::new(NullNotifier)
        }
    };

    let gate: Arc<dyn AdmissionGate> = match &config.storage.blacklist_path {
        Some(path) => Arc::new(BlacklistGate::load(path)),
        None => Arc::new(OpenGate),
    };

    let store = StoreActor::spawn(
        LadderSettings {
            base_amount: config.trading.base_amount,
            growth_pct: config.trading.growth_pct,
            max_tracks: config.trading.max_tracks,
        },
        config.trading.capacity,
        &config.storage.state_path,
        &config.storage.history_path,
    )
    .context("failed to open durable state")?;

    Ok(TradeEngine::new(
        store,
        exchange,
        notifier,
        gate,
        &config.trading,
    ))
}

async fn run(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path).context("failed to load configuration")?;
    let engine = build_engine(&config)?;

    let summary = engine.start().await?;
    info!(
        resumed = summary.resumed_pending + summary.resumed_filled,
        cleaned = summary.cleaned.len(),
        "engine running; press ctrl-c to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

async fn status(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path).context("failed to load configuration")?;
    let store = StoreActor::spawn(
        LadderSettings {
            base_amount: config.trading.base_amount,
            growth_pct: config.trading.growth_pct,
            max_tracks: config.trading.max_tracks,
        },
        config.trading.capacity,
        &config.storage.state_path,
        &config.storage.history_path,
    )
    .context("failed to open durable state")?;

    let snap = store.snapshot().await?;
    println!("open positions : {}/{}", snap.open_count, snap.capacity);
    println!("next track     : {}", snap.next_track);
    println!(
        "totals         : {} trades | {} closed | {} drawn down | {} stopped | {} failed",
        snap.counters.total,
        snap.counters.successful,
        snap.counters.drawdown,
        snap.counters.stopped,
        snap.counters.failed,
    );
    for track in &snap.tracks {
        if track.positions.is_empty() {
            println!("track {:>2} [{:>10}] —", track.track, track.amount);
        }
        for pos in &track.positions {
            println!(
                "track {:>2} [{:>10}] {} slot {} {} entry {} fill {}",
                track.track,
                track.amount,
                pos.symbol,
                pos.slot_id,
                pos.status,
                pos.entry,
                pos.fill_price
                    .map_or_else(|| "-".to_string(), |p| p.to_string()),
            );
        }
    }
    Ok(())
}
