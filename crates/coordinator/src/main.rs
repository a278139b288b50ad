//! Fanout Coordinator - Main Entry Point
//!
//! Builds the distribution layer from configuration, probes the worker pool
//! and keeps the pool's health fresh until shutdown.

use anyhow::Context;
use fanout_common::FanoutConfig;
use fanout_coordinator::Distributor;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match std::env::var("FANOUT_CONFIG") {
        Ok(path) => FanoutConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        Err(_) => FanoutConfig::from_env().context("loading configuration from environment")?,
    };

    // Initialize logging
    let default_filter = format!(
        "fanout_coordinator={level},fanout_common={level}",
        level = config.log_level()
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Fanout Coordinator with {} instances from {}:{}",
        config.pool.num_instances, config.pool.host, config.pool.base_port
    );

    let distributor = Distributor::new(config).context("building distributor")?;

    let report = distributor.refresh_health().await;
    if report.healthy == 0 {
        warn!("No healthy workers at startup out of {}", report.total);
    }

    let stats = distributor.stats();
    info!(
        "Worker pool: {} total, {} healthy, {} unhealthy",
        stats.total, stats.healthy, stats.unhealthy
    );
    for worker in &stats.workers {
        info!(
            "  {} model={} healthy={} load_weight={}",
            worker.url, worker.model, worker.healthy, worker.load_weight
        );
    }

    distributor.spawn_health_refresh();

    info!("Fanout Coordinator running");

    signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("Received shutdown signal");

    drop(distributor);

    info!("Fanout Coordinator shutdown complete");
    Ok(())
}
