//! Fanout common library
//!
//! This crate contains configuration, errors and metrics shared across Fanout components.

pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use crate::config::FanoutConfig;
pub use error::{FanoutError, Result};
pub use metrics::{MetricsRegistry, METRICS};
