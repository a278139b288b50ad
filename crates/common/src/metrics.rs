//! Metrics collection for Fanout
//!
//! This module provides Prometheus metrics for the distribution layer.

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics registry for Fanout
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub distribution: DistributionMetrics,
    pub pool: PoolMetrics,
}

/// Per-cycle distribution metrics
#[derive(Debug, Clone)]
pub struct DistributionMetrics {
    /// Total number of distribution cycles started
    pub cycles_total: IntCounter,

    /// Cycles where every partition succeeded
    pub cycles_succeeded: IntCounter,

    /// Cycles where some but not all partitions failed
    pub cycles_partial: IntCounter,

    /// Cycles that failed as a whole
    pub cycles_failed: IntCounter,

    /// Work items submitted
    pub items_total: IntCounter,

    /// Partitions sent to workers
    pub partitions_dispatched: IntCounter,

    /// Partitions that failed or returned a mismatched result
    pub partitions_failed: IntCounter,

    /// End-to-end cycle duration
    pub cycle_duration: Histogram,

    /// Single partition call duration
    pub partition_duration: Histogram,
}

/// Worker pool metrics
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Workers currently believed healthy
    pub healthy_workers: IntGauge,

    /// Workers currently believed unhealthy
    pub unhealthy_workers: IntGauge,

    /// Health queries issued
    pub health_probes: IntCounter,

    /// Health queries that reported a worker unhealthy
    pub health_probe_failures: IntCounter,

    /// Cycles rejected because no worker was healthy
    pub no_workers_available: IntCounter,
}

lazy_static! {
    /// Global metrics registry instance
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).unwrap();
    registry.register(Box::new(counter.clone())).unwrap();
    counter
}

fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    let gauge = IntGauge::new(name, help).unwrap();
    registry.register(Box::new(gauge.clone())).unwrap();
    gauge
}

fn histogram(registry: &Registry, name: &str, help: &str, buckets: Vec<f64>) -> Histogram {
    let histogram = Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets)).unwrap();
    registry.register(Box::new(histogram.clone())).unwrap();
    histogram
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        // Calls run for seconds to minutes
        let latency_buckets = vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

        let distribution = DistributionMetrics {
            cycles_total: counter(
                &registry,
                "fanout_cycles_total",
                "Total number of distribution cycles",
            ),
            cycles_succeeded: counter(
                &registry,
                "fanout_cycles_succeeded_total",
                "Distribution cycles where every partition succeeded",
            ),
            cycles_partial: counter(
                &registry,
                "fanout_cycles_partial_total",
                "Distribution cycles with some failed partitions",
            ),
            cycles_failed: counter(
                &registry,
                "fanout_cycles_failed_total",
                "Distribution cycles that failed as a whole",
            ),
            items_total: counter(
                &registry,
                "fanout_items_total",
                "Total number of work items submitted",
            ),
            partitions_dispatched: counter(
                &registry,
                "fanout_partitions_dispatched_total",
                "Total number of partitions sent to workers",
            ),
            partitions_failed: counter(
                &registry,
                "fanout_partitions_failed_total",
                "Total number of failed partitions",
            ),
            cycle_duration: histogram(
                &registry,
                "fanout_cycle_duration_seconds",
                "Distribution cycle duration in seconds",
                latency_buckets.clone(),
            ),
            partition_duration: histogram(
                &registry,
                "fanout_partition_duration_seconds",
                "Worker call duration per partition in seconds",
                latency_buckets,
            ),
        };

        let pool = PoolMetrics {
            healthy_workers: gauge(
                &registry,
                "fanout_healthy_workers",
                "Current number of healthy workers",
            ),
            unhealthy_workers: gauge(
                &registry,
                "fanout_unhealthy_workers",
                "Current number of unhealthy workers",
            ),
            health_probes: counter(
                &registry,
                "fanout_health_probes_total",
                "Total number of worker health queries",
            ),
            health_probe_failures: counter(
                &registry,
                "fanout_health_probe_failures_total",
                "Health queries that found a worker unhealthy",
            ),
            no_workers_available: counter(
                &registry,
                "fanout_no_workers_available_total",
                "Cycles rejected due to no healthy workers",
            ),
        };

        MetricsRegistry {
            registry,
            distribution,
            pool,
        }
    }

    /// Gather all metrics as text
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
