//! GPU Hub - central telemetry aggregator
//!
//! Agents on GPU hosts push snapshots to this service, which keeps the
//! latest state and a short rolling history per agent and serves them to
//! dashboards and the `gpuhub` CLI.

use anyhow::{Context, Result};
use gpu_hub::{api, config::HubConfig};
use hub_lib::{
    health::{components, HealthRegistry},
    observability::{HubMetrics, StructuredLogger},
    AggregateStore, RetentionSweeperBuilder,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const HUB_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting gpu-hub");

    let config = HubConfig::load()?;
    info!(
        instance = %config.instance_name,
        data_timeout_secs = config.data_timeout_secs,
        history_capacity = config.history_capacity,
        "Hub configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SWEEPER);
    health_registry.register(components::API);

    let metrics = HubMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);
    let store = AggregateStore::new(config.store_config());

    let sweeper_config = config.sweeper_config();
    let sweeper = RetentionSweeperBuilder::new()
        .store(store.clone())
        .interval(sweeper_config.interval)
        .eviction_timeout(sweeper_config.eviction_timeout)
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown_tx.subscribe()));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let app_state = Arc::new(api::AppState::new(
        store,
        health_registry.clone(),
        metrics,
        logger.clone(),
    ));

    let mut server_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(api::serve(listener, app_state, async move {
        let _ = server_shutdown.recv().await;
    }));

    health_registry.set_ready(true);
    logger.log_startup(HUB_VERSION, &addr);

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false);

    let _ = shutdown_tx.send(());
    if let Err(e) = sweeper_handle.await {
        warn!(error = %e, "Sweeper task ended abnormally");
    }
    api_handle.await??;

    info!("Shut down cleanly");
    Ok(())
}
