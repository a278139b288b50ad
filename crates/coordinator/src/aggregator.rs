//! Result aggregation
//!
//! Merges partition outcomes back into one response list in assignment
//! order. Items of failed partitions are left out rather than padded.

use crate::dispatcher::DispatchOutcome;
use fanout_common::error::{FanoutError, Result};
use serde::Serialize;
use tracing::{error, warn};

/// Final answer of a distribution cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    /// Results of the successful partitions, in batch order
    pub responses: Vec<String>,

    /// Adapter reported by the workers (or requested, if none echoed it)
    pub adapter_used: Option<String>,

    /// Number of workers a partition was sent to
    pub workers_used: usize,

    /// Size of the submitted batch
    pub total_items: usize,

    pub failed_partitions: usize,

    /// Assignment indices of the failed partitions
    pub failed_indices: Vec<usize>,
}

impl AggregateResult {
    /// Result of a cycle that had nothing to do
    pub fn empty(adapter: Option<String>) -> Self {
        Self {
            responses: Vec::new(),
            adapter_used: adapter,
            workers_used: 0,
            total_items: 0,
            failed_partitions: 0,
            failed_indices: Vec::new(),
        }
    }

    /// Some but not all partitions failed
    pub fn is_partial(&self) -> bool {
        self.failed_partitions > 0
    }
}

/// Combine outcomes, consumed in assignment order
///
/// A successful response whose length differs from its partition counts as
/// a failed partition. Fails when there was at least one outcome and none
/// succeeded.
pub fn aggregate(
    mut outcomes: Vec<DispatchOutcome>,
    total_items: usize,
    requested_adapter: Option<&str>,
) -> Result<AggregateResult> {
    outcomes.sort_by_key(|o| o.index);

    let workers_used = outcomes.len();
    let mut responses = Vec::with_capacity(total_items);
    let mut adapter_used = None;
    let mut failed_indices = Vec::new();

    for outcome in outcomes {
        match outcome.result {
            Ok(response) if response.responses.len() == outcome.expected_len => {
                if adapter_used.is_none() {
                    adapter_used = response.lora_adapter_used;
                }
                responses.extend(response.responses);
            }
            Ok(response) => {
                error!(
                    "Batch {} from {} returned {} results for {} items, discarding",
                    outcome.index,
                    outcome.worker_url,
                    response.responses.len(),
                    outcome.expected_len
                );
                failed_indices.push(outcome.index);
            }
            Err(e) => {
                error!("Batch {} failed: {}", outcome.index, e);
                failed_indices.push(outcome.index);
            }
        }
    }

    let failed_partitions = failed_indices.len();
    if failed_partitions > 0 {
        warn!("Failed batches: {:?}", failed_indices);
        if failed_partitions == workers_used {
            return Err(FanoutError::AllPartitionsFailed {
                failed: failed_partitions,
            });
        }
    }

    Ok(AggregateResult {
        responses,
        adapter_used: adapter_used.or_else(|| requested_adapter.map(str::to_string)),
        workers_used,
        total_items,
        failed_partitions,
        failed_indices,
    })
}
