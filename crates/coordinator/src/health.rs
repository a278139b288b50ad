//! Worker health probing
//!
//! Every probe cycle queries all workers concurrently and then overwrites
//! each worker's health flag with the latest answer.

use crate::registry::{Worker, WorkerRegistry};
use crate::worker_client::WorkerClient;
use fanout_common::METRICS;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of probing one worker
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub url: String,
    pub healthy: bool,

    /// Why the worker was judged unhealthy
    pub error: Option<String>,
}

/// Result of one probe cycle across the pool
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub total: usize,
    pub healthy: usize,
    pub results: Vec<ProbeResult>,
}

/// Concurrent health prober
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: WorkerClient,
    registry: Arc<WorkerRegistry>,
}

impl HealthProbe {
    pub fn new(client: WorkerClient, registry: Arc<WorkerRegistry>) -> Self {
        Self { client, registry }
    }

    /// Probe one worker without touching the registry
    pub async fn probe(&self, worker: &Worker) -> ProbeResult {
        METRICS.pool.health_probes.inc();

        let (healthy, error) = match self.client.health_check(worker).await {
            Ok(true) => (true, None),
            Ok(false) => (false, Some("engine not ready".to_string())),
            Err(e) => (false, Some(e.to_string())),
        };

        if !healthy {
            METRICS.pool.health_probe_failures.inc();
        }

        ProbeResult {
            url: worker.url().to_string(),
            healthy,
            error,
        }
    }

    /// Probe every worker and record the results
    pub async fn refresh(&self) -> HealthReport {
        let probes = self
            .registry
            .all_workers()
            .iter()
            .map(|worker| self.probe(worker));
        let results = join_all(probes).await;

        for result in &results {
            match &result.error {
                None => {
                    self.registry.set_healthy(&result.url, true);
                }
                Some(reason) => {
                    warn!("Health check failed for {}: {}", result.url, reason);
                    self.registry.mark_unhealthy(&result.url, reason.clone());
                }
            }
        }

        let healthy = results.iter().filter(|r| r.healthy).count();
        debug!("Health refresh: {}/{} workers healthy", healthy, results.len());

        HealthReport {
            total: results.len(),
            healthy,
            results,
        }
    }

    /// Start a background refresh loop
    ///
    /// The loop runs until the returned handle is aborted.
    pub fn spawn_refresh_loop(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Starting periodic health refresh every {:?}", interval);
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;
                let report = self.refresh().await;
                if report.healthy == 0 {
                    warn!("No healthy workers out of {}", report.total);
                }
            }
        })
    }
}
