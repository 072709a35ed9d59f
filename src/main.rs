//! QUORUM: multi-participant weighted-vote trading consensus engine.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! assembles the participant pool and collaborators, then either runs a
//! single debate (`quorum BTC-USD`) or serves the HTTP API until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use quorum::alerts::AlertNotifier;
use quorum::config::{self, AppConfig};
use quorum::data::MarketFeed;
use quorum::engine::Coordinator;
use quorum::memory::RagMemory;
use quorum::participants::build_pool;
use quorum::server::{self, ServerState};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("QUORUM_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();
    info!(
        config = %config_path,
        participants = cfg.participants.len(),
        threshold = cfg.engine.consensus_threshold,
        max_rounds = cfg.engine.max_rounds,
        "QUORUM starting up"
    );

    // -- Initialise components -------------------------------------------

    let pool = build_pool(&cfg.participants)?;
    let feed = MarketFeed::from_config(&cfg.data)?;
    let memory = RagMemory::from_config(&cfg.memory).await?;
    let notifier = Arc::new(AlertNotifier::from_config(&cfg.alerts)?);

    let coordinator = Arc::new(Coordinator::new(
        pool,
        Arc::new(feed),
        Arc::new(memory),
        cfg.engine.clone(),
    ));

    // -- One-shot mode ---------------------------------------------------

    if let Some(ticker) = std::env::args().nth(1) {
        return run_once(&coordinator, &notifier, &ticker).await;
    }

    // -- Server mode -----------------------------------------------------

    if !cfg.server.enabled {
        warn!("Server disabled and no ticker given; nothing to do");
        return Ok(());
    }

    let state = Arc::new(ServerState { coordinator, notifier });
    server::serve(state, cfg.server.port, shutdown_signal()).await?;
    info!("QUORUM shut down cleanly.");
    Ok(())
}

/// Run one debate and print its record as JSON.
async fn run_once(coordinator: &Coordinator, notifier: &AlertNotifier, raw: &str) -> Result<()> {
    let Some(ticker) = server::routes::normalize_ticker(raw) else {
        anyhow::bail!("Invalid ticker: {raw:?}");
    };

    match coordinator.run_debate(&ticker).await {
        Ok(record) => {
            info!(%record, "Debate finished");
            notifier.notify(&record).await;
            let json = serde_json::to_string_pretty(&record).context("Failed to serialise session record")?;
            println!("{json}");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, kind = e.kind(), "Debate failed");
            Err(e.into())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER));

    if std::env::var("QUORUM_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
