//! surge advisor
//!
//! A cooperative scheduling advisor that runs beside the orchestrator's
//! primary scheduler. In steady state it is dormant and answers every
//! advisory call with "no opinion". When the telemetry backend reports a
//! traffic spike it builds a dependency graph from workload annotations,
//! forms ephemeral co-location gangs, and biases placement toward hosts
//! already running gang peers. When the spike subsides all in-memory state
//! dissolves and the advisor returns to dormancy.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use surge_advisor::api;
use surge_advisor::config::Config;
use surge_advisor::controller::Controller;
use surge_advisor::gang::GangManager;
use surge_advisor::graph::DependencyGraph;
use surge_advisor::inventory::{HttpInventory, Inventory};
use surge_advisor::metrics::Metrics;
use surge_advisor::scorer::NodeScorer;
use surge_advisor::service::ServiceCatalog;
use surge_advisor::spike::SpikeDetector;
use surge_advisor::state::AppState;
use surge_advisor::telemetry::PromClient;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to SURGE_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting surge advisor");
    info!(
        listen_addr = %config.listen_addr,
        telemetry_url = %config.telemetry_url,
        qps_threshold = config.qps_threshold,
        error_rate_threshold = config.error_rate_threshold,
        p95_latency_threshold_ms = config.p95_latency_threshold_ms,
        poll_interval_secs = config.poll_interval.as_secs(),
        cooldown_secs = config.cooldown.as_secs(),
        "Configuration loaded"
    );

    // The orchestrator client is the only fatal initialization path.
    let inventory: Arc<dyn Inventory> = match HttpInventory::from_config(
        config.orchestrator_url.as_deref(),
        config.orchestrator_token_file.as_ref(),
        config.orchestrator_timeout,
    ) {
        Ok(inventory) => Arc::new(inventory),
        Err(e) => {
            error!(error = %e, "Failed to construct orchestrator client");
            return Err(e);
        }
    };

    let telemetry = Arc::new(PromClient::new(
        &config.telemetry_url,
        config.telemetry_timeout,
    )?);
    let metrics = Arc::new(Metrics::new()?);
    let catalog = Arc::new(ServiceCatalog::new(config.known_services.clone()));
    let graph = Arc::new(DependencyGraph::new(
        inventory.clone(),
        catalog.clone(),
        config.builtin_groups,
    ));
    let gangs = Arc::new(GangManager::new(catalog.clone(), metrics.clone()));
    let scorer = Arc::new(NodeScorer::new(inventory.clone(), catalog.clone()));
    let detector = SpikeDetector::new(telemetry, config.spike_thresholds());
    let controller = Arc::new(Controller::new(
        detector,
        graph.clone(),
        gangs.clone(),
        inventory.clone(),
        metrics.clone(),
        config.cooldown,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(
        controller
            .clone()
            .run_spike_poller(config.poll_interval, shutdown_rx.clone()),
    );
    tokio::spawn(
        controller
            .clone()
            .run_cooldown_checker(config.cooldown_check_interval, shutdown_rx.clone()),
    );

    let state = AppState::new(controller, gangs, graph, scorer, inventory, catalog, metrics);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    info!("Termination signal received, shutting down");
}
