//! Worker registry
//!
//! Holds the fixed pool of worker endpoints together with the coordinator's
//! current belief about each one's health. The pool is built once from
//! configuration; only health state changes afterwards.

use fanout_common::config::PoolConfig;
use fanout_common::error::{FanoutError, Result};
use fanout_common::METRICS;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Diagnostic state that accompanies the health flag
#[derive(Debug, Default)]
struct WorkerStatus {
    /// When health was last updated by a probe or a call
    last_checked: Option<Instant>,

    /// Why the worker was last marked unhealthy
    last_error: Option<String>,
}

/// One backend endpoint
#[derive(Debug)]
pub struct Worker {
    /// Position in the pool
    index: usize,

    port: u16,
    base_url: String,

    /// Model served by this worker
    model_name: String,

    /// Relative capacity; not consulted by the current split policy
    load_weight: f64,

    /// Health flag
    healthy: AtomicBool,

    status: RwLock<WorkerStatus>,
}

impl Worker {
    fn new(index: usize, host: &str, port: u16, model_name: &str, load_weight: f64) -> Self {
        Self {
            index,
            port,
            base_url: format!("http://{}:{}", host, port),
            model_name: model_name.to_string(),
            load_weight,
            healthy: AtomicBool::new(true),
            status: RwLock::new(WorkerStatus::default()),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL, e.g. `http://127.0.0.1:8000`
    pub fn url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of an endpoint on this worker
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn load_weight(&self) -> f64 {
        self.load_weight
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Last recorded failure reason, if the worker is unhealthy
    pub fn last_error(&self) -> Option<String> {
        self.status.read().last_error.clone()
    }

    /// Flag and reason change together under the status lock
    fn update(&self, healthy: bool, error: Option<String>) -> bool {
        let mut status = self.status.write();
        let was_healthy = self.healthy.swap(healthy, Ordering::AcqRel);
        status.last_checked = Some(Instant::now());
        status.last_error = error;
        was_healthy
    }

    fn stats(&self) -> WorkerStats {
        let status = self.status.read();
        WorkerStats {
            url: self.base_url.clone(),
            model: self.model_name.clone(),
            healthy: self.is_healthy(),
            load_weight: self.load_weight,
            last_error: status.last_error.clone(),
            last_checked_secs_ago: status.last_checked.map(|t| t.elapsed().as_secs_f64()),
        }
    }
}

/// Per-worker entry of a stats snapshot
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub url: String,
    pub model: String,
    pub healthy: bool,
    pub load_weight: f64,
    pub last_error: Option<String>,
    pub last_checked_secs_ago: Option<f64>,
}

/// Read-only snapshot of the pool
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub workers: Vec<WorkerStats>,
}

/// Fixed, ordered pool of workers
#[derive(Debug)]
pub struct WorkerRegistry {
    workers: Vec<Arc<Worker>>,
}

impl WorkerRegistry {
    /// Build the pool `host:base_port .. host:base_port + num_instances - 1`
    pub fn from_config(pool: &PoolConfig) -> Result<Self> {
        if pool.num_instances == 0 {
            return Err(FanoutError::config("At least one worker instance is required"));
        }

        let workers = (0..pool.num_instances)
            .map(|i| {
                let port = u16::try_from(pool.base_port as usize + i).map_err(|_| {
                    FanoutError::config(format!(
                        "Worker {} port exceeds {} (base port {})",
                        i,
                        u16::MAX,
                        pool.base_port
                    ))
                })?;
                let worker = Worker::new(i, &pool.host, port, &pool.model_name, pool.load_weight);
                info!("Initialized worker {}: {}", i, worker.url());
                Ok(Arc::new(worker))
            })
            .collect::<Result<Vec<_>>>()?;

        let registry = Self { workers };
        registry.publish_gauges();
        Ok(registry)
    }

    /// Every worker, in pool order
    pub fn all_workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    /// Workers currently believed healthy, in pool order
    pub fn healthy_workers(&self) -> Vec<Arc<Worker>> {
        self.workers
            .iter()
            .filter(|w| w.is_healthy())
            .cloned()
            .collect()
    }

    /// Look up a worker by base URL
    pub fn get(&self, url: &str) -> Option<&Arc<Worker>> {
        self.workers.iter().find(|w| w.url() == url)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn healthy_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_healthy()).count()
    }

    /// Mark a worker healthy or unhealthy without a recorded reason
    ///
    /// Returns `false` if no worker has this URL.
    pub fn set_healthy(&self, url: &str, healthy: bool) -> bool {
        let Some(worker) = self.get(url) else {
            return false;
        };

        if worker.update(healthy, None) != healthy {
            debug!("Worker {} health changed to {}", url, healthy);
        }
        self.publish_gauges();
        true
    }

    /// Mark a worker unhealthy, recording why
    ///
    /// Safe to call from several in-flight calls at once.
    pub fn mark_unhealthy(&self, url: &str, reason: impl Into<String>) -> bool {
        let Some(worker) = self.get(url) else {
            return false;
        };

        let reason = reason.into();
        if worker.update(false, Some(reason.clone())) {
            warn!("Worker {} marked as unhealthy: {}", url, reason);
        }
        self.publish_gauges();
        true
    }

    /// Snapshot of the pool for reporting
    pub fn stats(&self) -> RegistryStats {
        let workers: Vec<WorkerStats> = self.workers.iter().map(|w| w.stats()).collect();
        let healthy = workers.iter().filter(|w| w.healthy).count();

        RegistryStats {
            total: workers.len(),
            healthy,
            unhealthy: workers.len() - healthy,
            workers,
        }
    }

    fn publish_gauges(&self) {
        let healthy = self.healthy_count();
        METRICS.pool.healthy_workers.set(healthy as i64);
        METRICS
            .pool
            .unhealthy_workers
            .set((self.workers.len() - healthy) as i64);
    }
}
