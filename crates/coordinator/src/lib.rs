//! Fanout Coordinator
//!
//! Splits batches of work items across a pool of inference workers, tracks
//! worker health and reassembles partial results.

pub mod aggregator;
pub mod dispatcher;
pub mod distributor;
pub mod health;
pub mod options;
pub mod registry;
pub mod splitter;
pub mod worker_client;

pub use aggregator::AggregateResult;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use distributor::Distributor;
pub use health::{HealthProbe, HealthReport, ProbeResult};
pub use options::InferenceOptions;
pub use registry::{RegistryStats, Worker, WorkerRegistry, WorkerStats};
pub use splitter::{split_batch, Partition};
pub use worker_client::WorkerClient;
