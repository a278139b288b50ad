//! Worker client for communication from coordinator to workers

use crate::registry::Worker;
use fanout_common::error::{FanoutError, Result};
use fanout_proto::{
    BatchInferenceRequest, BatchInferenceResponse, HealthCheckResponse, HEALTH_PATH,
    INFERENCE_PATH,
};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Longest slice of an error body kept in a failure reason
const MAX_ERROR_BODY: usize = 512;

/// Shared HTTP session to the worker pool
///
/// Cloning is cheap and every clone shares one connection pool, so a
/// single client serves all in-flight probes and partition calls.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    client: reqwest::Client,
    request_timeout: Duration,
    health_timeout: Duration,
}

impl WorkerClient {
    /// Build the session
    pub fn new(request_timeout: Duration, health_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| FanoutError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            request_timeout,
            health_timeout,
        })
    }

    /// Query the worker's readiness
    ///
    /// `Ok(false)` means the worker answered but is not ready; transport,
    /// status and decode problems come back as errors.
    pub async fn health_check(&self, worker: &Worker) -> Result<bool> {
        let response = self
            .client
            .get(worker.endpoint(HEALTH_PATH))
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| transport_error(worker, e))?;

        let health: HealthCheckResponse = decode(worker, response).await?;
        Ok(health.engine_ready)
    }

    /// Run one partition on the worker
    pub async fn infer(
        &self,
        worker: &Worker,
        request: &BatchInferenceRequest,
    ) -> Result<BatchInferenceResponse> {
        let response = self
            .client
            .post(worker.endpoint(INFERENCE_PATH))
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(worker, e))?;

        decode(worker, response).await
    }
}

async fn decode<T: DeserializeOwned>(worker: &Worker, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| transport_error(worker, e))?;

    if !status.is_success() {
        let text = String::from_utf8_lossy(&body);
        let text: String = text.chars().take(MAX_ERROR_BODY).collect();
        return Err(FanoutError::HttpStatus {
            status: status.as_u16(),
            body: text,
        });
    }

    serde_json::from_slice(&body)
        .map_err(|e| FanoutError::decode(format!("{} returned malformed body: {}", worker.url(), e)))
}

fn transport_error(worker: &Worker, err: reqwest::Error) -> FanoutError {
    if err.is_timeout() {
        FanoutError::timeout(format!("{}: {}", worker.url(), err))
    } else if err.is_decode() {
        FanoutError::decode(format!("{}: {}", worker.url(), err))
    } else {
        FanoutError::connection(format!("{}: {}", worker.url(), err))
    }
}
