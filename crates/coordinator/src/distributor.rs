//! Batch distribution across the worker pool
//!
//! A [`Distributor`] owns the registry and the shared HTTP session for its
//! whole lifetime. Each call to [`Distributor::distribute`] runs one cycle:
//! probe, split, dispatch, aggregate.

use crate::aggregator::{aggregate, AggregateResult};
use crate::dispatcher::Dispatcher;
use crate::health::{HealthProbe, HealthReport};
use crate::options::InferenceOptions;
use crate::registry::{RegistryStats, WorkerRegistry};
use crate::splitter::split_batch;
use crate::worker_client::WorkerClient;
use fanout_common::error::{FanoutError, Result};
use fanout_common::{FanoutConfig, METRICS};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// The distribution layer
#[derive(Debug)]
pub struct Distributor {
    config: FanoutConfig,
    registry: Arc<WorkerRegistry>,
    probe: HealthProbe,
    dispatcher: Dispatcher,

    /// Background refresh loop, aborted when the distributor is dropped
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl Distributor {
    /// Build the worker pool and open the HTTP session
    pub fn new(config: FanoutConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(WorkerRegistry::from_config(&config.pool)?);
        let client = WorkerClient::new(config.request_timeout(), config.health_timeout())?;
        let probe = HealthProbe::new(client.clone(), registry.clone());
        let dispatcher = Dispatcher::new(client, registry.clone());

        info!(
            "Distributor initialized with {} workers (request timeout {:?})",
            registry.len(),
            config.request_timeout()
        );

        Ok(Self {
            config,
            registry,
            probe,
            dispatcher,
            refresh_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &FanoutConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Split `batch` across the healthy workers and merge their results
    pub async fn distribute(
        &self,
        batch: Vec<String>,
        options: InferenceOptions,
    ) -> Result<AggregateResult> {
        let span = info_span!("distribute", cycle_id = %Uuid::new_v4(), items = batch.len());
        self.run_cycle(batch, options).instrument(span).await
    }

    async fn run_cycle(
        &self,
        batch: Vec<String>,
        options: InferenceOptions,
    ) -> Result<AggregateResult> {
        options.validate()?;

        if batch.is_empty() {
            if self.config.dispatch.reject_empty_batches {
                return Err(FanoutError::invalid_input("list_messages cannot be empty"));
            }
            return Ok(AggregateResult::empty(options.adapter));
        }

        let start = Instant::now();
        let total_items = batch.len();
        METRICS.distribution.cycles_total.inc();
        METRICS.distribution.items_total.inc_by(total_items as u64);

        if self.config.dispatch.probe_before_dispatch {
            self.probe.refresh().await;
        }

        let healthy = self.registry.healthy_workers();
        if healthy.is_empty() {
            METRICS.pool.no_workers_available.inc();
            METRICS.distribution.cycles_failed.inc();
            return Err(FanoutError::no_healthy_workers(format!(
                "0 of {} workers healthy",
                self.registry.len()
            )));
        }

        let partitions = split_batch(batch, &healthy)?;
        info!(
            "Distributing {} messages across {} instances (adapter: {:?})",
            total_items,
            partitions.len(),
            options.adapter
        );

        let outcomes = self.dispatcher.dispatch(partitions, &options).await;
        let result = aggregate(outcomes, total_items, options.adapter.as_deref());

        METRICS
            .distribution
            .cycle_duration
            .observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(merged) if merged.is_partial() => {
                METRICS.distribution.cycles_partial.inc();
                METRICS
                    .distribution
                    .partitions_failed
                    .inc_by(merged.failed_partitions as u64);
                warn!(
                    "Partial result: {} of {} batches failed, {}/{} responses",
                    merged.failed_partitions,
                    merged.workers_used,
                    merged.responses.len(),
                    total_items
                );
            }
            Ok(merged) => {
                METRICS.distribution.cycles_succeeded.inc();
                info!(
                    "Distributed inference completed: {} instances used in {:?}",
                    merged.workers_used,
                    start.elapsed()
                );
            }
            Err(e) => {
                METRICS.distribution.cycles_failed.inc();
                if let FanoutError::AllPartitionsFailed { failed } = e {
                    METRICS.distribution.partitions_failed.inc_by(*failed as u64);
                }
                warn!("Distributed inference failed: {}", e);
            }
        }

        result
    }

    /// Probe every worker now
    pub async fn refresh_health(&self) -> HealthReport {
        self.probe.refresh().await
    }

    /// Snapshot of the pool
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// Start the periodic health refresh, if an interval is configured
    ///
    /// Returns `true` if a loop is running afterwards. Must be called from
    /// within a tokio runtime.
    pub fn spawn_health_refresh(&self) -> bool {
        let Some(interval) = self.config.refresh_interval() else {
            return false;
        };

        let mut task = self.refresh_task.lock();
        if task.is_none() {
            *task = Some(self.probe.clone().spawn_refresh_loop(interval));
        }
        true
    }
}

impl Drop for Distributor {
    fn drop(&mut self) {
        if let Some(task) = self.refresh_task.get_mut().take() {
            task.abort();
            info!("Stopped periodic health refresh");
        }
    }
}
