//! Podium - traffic verification coordinator
//!
//! Runs next to a fleet of lydian agents, registers probe rules with them,
//! answers result queries and serves the operator API.

use anyhow::{Context, Result};
use podium_lib::{
    config::LiveConfig,
    health::{components, FleetHealth},
    observability::{PodiumMetrics, StructuredLogger},
    recorder::RecorderRegistry,
    rules::RuleStore,
    GrpcConnector, Podium, SharedConfig,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const PODIUM_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting podium");

    let daemon = config::DaemonConfig::load()?;
    let live = Arc::new(LiveConfig::load(daemon.config_path.as_deref())?);
    // Reload on file changes for as long as the process runs
    let _watcher = match live.watch() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            info!(reason = %e, "Configuration file watching disabled");
            None
        }
    };
    let settings: SharedConfig = live;
    info!(
        api_port = daemon.api_port,
        servers_first = settings.settings().traffic_start_servers_first,
        "Podium configured"
    );

    let health = FleetHealth::new();
    for component in [
        components::DISPATCH,
        components::PIPELINE,
        components::MONITOR,
        components::RECORDERS,
    ] {
        health.register(component).await;
    }

    let metrics = PodiumMetrics::new();
    let logger = StructuredLogger::new(&daemon.coordinator_name);
    logger.log_startup(PODIUM_VERSION, daemon.api_port);

    let rules = match &daemon.rule_store_path {
        Some(path) => RuleStore::with_persistence(path)
            .with_context(|| format!("Failed to open rule store {}", path.display()))?,
        None => RuleStore::new(),
    };

    let podium = Arc::new(
        Podium::builder(
            Arc::clone(&settings),
            Arc::new(GrpcConnector::new(Arc::clone(&settings))),
        )
        .rule_store(Arc::new(rules))
        .recorders(Arc::new(RecorderRegistry::with_defaults(Arc::clone(
            &settings,
        ))))
        .health(health.clone())
        .build(),
    );

    podium.start_primary_monitor().await;

    let app_state = Arc::new(api::AppState::new(Arc::clone(&podium), metrics));
    let api_handle = tokio::spawn(api::serve(daemon.api_port, app_state));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
        served = api_handle => {
            match served {
                Ok(Ok(())) => logger.log_shutdown("API server exited"),
                Ok(Err(e)) => {
                    warn!(error = %e, "API server failed");
                    logger.log_shutdown("API server failed");
                }
                Err(e) => {
                    warn!(error = %e, "API server task aborted");
                    logger.log_shutdown("API server task aborted");
                }
            }
        }
    }

    info!("Shutting down");
    podium.stop_primary_monitor().await;

    Ok(())
}
