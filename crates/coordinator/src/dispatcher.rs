//! Concurrent partition dispatch
//!
//! Sends every partition of a cycle to its worker at the same time and
//! waits for all of them to settle. A failed call marks its worker
//! unhealthy straight away and never affects sibling calls.

use crate::options::InferenceOptions;
use crate::registry::WorkerRegistry;
use crate::splitter::Partition;
use crate::worker_client::WorkerClient;
use fanout_common::error::Result;
use fanout_common::METRICS;
use fanout_proto::BatchInferenceResponse;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// What happened to one partition
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Assignment order of the partition
    pub index: usize,

    pub worker_url: String,

    /// Number of items that were sent
    pub expected_len: usize,

    pub result: Result<BatchInferenceResponse>,
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Issues partition calls against the pool
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: WorkerClient,
    registry: Arc<WorkerRegistry>,
}

impl Dispatcher {
    pub fn new(client: WorkerClient, registry: Arc<WorkerRegistry>) -> Self {
        Self { client, registry }
    }

    /// Send all partitions concurrently
    ///
    /// Outcomes come back in assignment order regardless of completion order.
    pub async fn dispatch(
        &self,
        partitions: Vec<Partition>,
        options: &InferenceOptions,
    ) -> Vec<DispatchOutcome> {
        METRICS
            .distribution
            .partitions_dispatched
            .inc_by(partitions.len() as u64);

        let calls = partitions
            .into_iter()
            .map(|partition| self.send(partition, options));

        join_all(calls).await
    }

    async fn send(&self, partition: Partition, options: &InferenceOptions) -> DispatchOutcome {
        let Partition {
            index,
            worker,
            items,
            ..
        } = partition;
        let expected_len = items.len();
        let request = options.to_request(items);

        let start = Instant::now();
        let result = self.client.infer(&worker, &request).await;
        METRICS
            .distribution
            .partition_duration
            .observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(response) => debug!(
                "Partition {} succeeded on {}: {} items in {:?}",
                index,
                worker.url(),
                response.responses.len(),
                start.elapsed()
            ),
            Err(e) => {
                warn!("Partition {} failed on {}: {}", index, worker.url(), e);
                self.registry.mark_unhealthy(worker.url(), e.to_string());
            }
        }

        DispatchOutcome {
            index,
            worker_url: worker.url().to_string(),
            expected_len,
            result,
        }
    }
}

