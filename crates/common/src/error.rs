//! Common error types for Fanout
//!
//! This module defines all error types used across the Fanout system.
//! All errors map onto an HTTP status so a front door can surface them directly.

use thiserror::Error;

/// Main error type for Fanout
#[derive(Error, Debug)]
pub enum FanoutError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection errors (refused, reset, DNS)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Worker answered with a non-success status
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Worker answered with a body we could not decode
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// No worker is currently healthy
    #[error("No healthy workers available: {0}")]
    NoHealthyWorkers(String),

    /// Every dispatched partition failed
    #[error("All {failed} inference batches failed")]
    AllPartitionsFailed { failed: usize },
}

impl FanoutError {
    /// Convert error to the HTTP status code a front door should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            FanoutError::InvalidInput(_) => 400,
            FanoutError::NoHealthyWorkers(_) | FanoutError::AllPartitionsFailed { .. } => 503,
            FanoutError::Timeout(_) => 504,
            FanoutError::Connection(_)
            | FanoutError::HttpStatus { .. }
            | FanoutError::Decode(_) => 502,
            FanoutError::Config(_) => 500,
        }
    }

    /// Whether the error means the pool as a whole could not serve the request
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            FanoutError::NoHealthyWorkers(_) | FanoutError::AllPartitionsFailed { .. }
        )
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        FanoutError::Config(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        FanoutError::Connection(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        FanoutError::Decode(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        FanoutError::InvalidInput(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        FanoutError::Timeout(msg.into())
    }

    /// Create a no-healthy-workers error
    pub fn no_healthy_workers(msg: impl Into<String>) -> Self {
        FanoutError::NoHealthyWorkers(msg.into())
    }
}

/// Result type alias for Fanout operations
pub type Result<T> = std::result::Result<T, FanoutError>;
