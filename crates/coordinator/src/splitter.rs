//! Batch splitting
//!
//! Partitions a batch into contiguous slices, one per healthy worker. The
//! first `len % workers` workers take one extra item. Worker load weights
//! are not consulted.

use crate::registry::Worker;
use fanout_common::error::{FanoutError, Result};
use std::sync::Arc;

/// A contiguous slice of a batch assigned to one worker
#[derive(Debug, Clone)]
pub struct Partition {
    /// Assignment order within the cycle
    pub index: usize,

    /// Position of the first item in the original batch
    pub offset: usize,

    pub worker: Arc<Worker>,
    pub items: Vec<String>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Partition sizes for `len` items over `workers` workers, empty slots dropped
pub fn partition_sizes(len: usize, workers: usize) -> Result<Vec<usize>> {
    if workers == 0 {
        return Err(FanoutError::no_healthy_workers(format!(
            "cannot split {} items without workers",
            len
        )));
    }

    let base = len / workers;
    let remainder = len % workers;

    Ok((0..workers)
        .map(|i| base + usize::from(i < remainder))
        .filter(|&size| size > 0)
        .collect())
}

/// Split `batch` across `workers` in order
///
/// Fails when `workers` is empty, whatever the batch length. An empty batch
/// yields no partitions.
pub fn split_batch(batch: Vec<String>, workers: &[Arc<Worker>]) -> Result<Vec<Partition>> {
    let sizes = partition_sizes(batch.len(), workers.len())?;

    let mut items = batch.into_iter();
    let mut offset = 0;

    let partitions = sizes
        .into_iter()
        .zip(workers)
        .enumerate()
        .map(|(index, (size, worker))| {
            let partition = Partition {
                index,
                offset,
                worker: worker.clone(),
                items: items.by_ref().take(size).collect(),
            };
            offset += size;
            partition
        })
        .collect();

    Ok(partitions)
}
