//! PULSE — Autonomous Token Momentum Trading Agent
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the data source, strategy, risk gate, venue, event bus, and
//! audit store together, and runs the tick loop with graceful shutdown.

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use pulse::config::AppConfig;
use pulse::dashboard::{self, routes::DashboardState};
use pulse::engine::executor::{ExecutionVenue, SimulatedVenue};
use pulse::engine::runner::TickEngine;
use pulse::events::EventBus;
use pulse::market::dexscreener::DexScreenerSource;
use pulse::market::simulated::SimulatedSource;
use pulse::market::MarketDataSource;
use pulse::signer::Signer;
use pulse::storage::{AuditStore, StorageHandle};
use pulse::strategy::momentum::MomentumStrategy;
use pulse::strategy::risk::RiskGate;
use pulse::strategy::DecisionOrchestrator;

const BANNER: &str = r#"
 ____  _   _ _     ____  _____
|  _ \| | | | |   / ___|| ____|
| |_) | | | | |   \___ \|  _|
|  __/| |_| | |___ ___) | |___
|_|    \___/|_____|____/|_____|

  Portfolio-gated Momentum Decision Loop
  v0.1.0 — Autonomous Agent
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        tick_interval_ms = cfg.agent.tick_interval_ms,
        dry_run = cfg.agent.dry_run,
        tokens = cfg.market_data.token_addresses.len(),
        "PULSE starting up"
    );

    // -- Initialise components -------------------------------------------

    // Market data source
    let source: Box<dyn MarketDataSource> = match cfg.market_data.source.as_str() {
        "dexscreener" => {
            info!("Using DexScreener market data");
            Box::new(DexScreenerSource::new(cfg.market_data.token_addresses.clone())?)
        }
        "simulated" => {
            info!(seed = ?cfg.market_data.simulation_seed, "Using simulated market data");
            Box::new(SimulatedSource::new(
                &cfg.market_data.token_addresses,
                cfg.market_data.simulation_seed,
            ))
        }
        other => {
            warn!(source = other, "Unknown market data source, defaulting to simulated");
            Box::new(SimulatedSource::new(
                &cfg.market_data.token_addresses,
                cfg.market_data.simulation_seed,
            ))
        }
    };

    // Signer. A missing key is fatal for live settlement; in dry-run a
    // throwaway key keeps the full pipeline exercised.
    let signer = match AppConfig::resolve_env(&cfg.execution.wallet_key_env) {
        Ok(key) => Signer::new(SecretString::new(key))?,
        Err(_) if cfg.agent.dry_run => {
            warn!(
                env = %cfg.execution.wallet_key_env,
                "No wallet key configured — using a throwaway dry-run key"
            );
            Signer::new(SecretString::new(format!("dry-run-{}", uuid::Uuid::new_v4())))?
        }
        Err(e) => return Err(e.context("Wallet key required outside dry-run")),
    };
    info!(signer = %signer.address(), "Signer ready");

    // Execution venue (simulated settlement; see DESIGN.md)
    let venue: Box<dyn ExecutionVenue> = Box::new(SimulatedVenue::new(
        signer,
        cfg.execution.latency_ms,
        cfg.execution.failure_rate,
        None,
    ));

    // Strategy orchestrator: the closed strategy list plus the risk gate
    let orchestrator = DecisionOrchestrator::new(
        vec![Box::new(MomentumStrategy::new(cfg.momentum.clone()))],
        RiskGate::new(cfg.risk.clone()),
    );

    // Audit store behind the fire-and-forget writer task
    let store = AuditStore::open(&cfg.storage.database_path)
        .await
        .context("Failed to open audit store")?;
    let (storage, _writer) = StorageHandle::spawn(store);
    info!(path = %cfg.storage.database_path, "Audit store ready");

    // Event bus and its dashboard subscriber
    let events = EventBus::default();
    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(&cfg.agent.name, cfg.agent.dry_run));
        dashboard::spawn_event_listener(state.clone(), &events);
        dashboard::spawn_dashboard(state, cfg.dashboard.port);
    }

    // Portfolio state is process-memory-only; no rehydration from the
    // audit trail on restart (see DESIGN.md), so every start is a flat book.
    info!("Starting with a flat portfolio");

    let mut engine = TickEngine::new(
        source,
        orchestrator,
        venue,
        events,
        storage,
        cfg.agent.dry_run,
    );

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_millis(cfg.agent.tick_interval_ms));
    // Overrunning ticks fire immediately after the late one completes:
    // never skipped, never overlapped (the tick is awaited in the arm).
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_ms = cfg.agent.tick_interval_ms,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match engine.run_tick().await {
                    Ok(audit) => {
                        info!(
                            tick = engine.tick_number(),
                            tick_id = %audit.tick_id,
                            evaluated = audit.tokens_evaluated,
                            executions = audit.executions.len(),
                            exposure = format!("{:.4}", engine.portfolio().total_exposure()),
                            "Tick reconciled"
                        );
                    }
                    Err(e) => {
                        // A bad tick never terminates the process
                        error!(error = %e, "Tick failed — continuing to next");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(
        ticks = engine.tick_number(),
        exposure = format!("{:.4}", engine.portfolio().total_exposure()),
        positions = engine.portfolio().active_positions(),
        "PULSE shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pulse=info"));

    let json_logging = std::env::var("PULSE_LOG_JSON").is_ok();

    if json_logging {
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
