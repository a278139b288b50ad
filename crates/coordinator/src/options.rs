//! Per-request options forwarded to every worker of a cycle

use fanout_common::error::{FanoutError, Result};
use fanout_proto::BatchInferenceRequest;
use serde::{Deserialize, Serialize};

/// Options shared by all partitions of one batch
///
/// Unknown fields are rejected when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InferenceOptions {
    /// LoRA adapter to apply
    #[serde(default, alias = "lora_adapter")]
    pub adapter: Option<String>,

    /// Upper bound on generated tokens per item
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Nucleus sampling threshold
    #[serde(default)]
    pub top_p: Option<f32>,
}

impl InferenceOptions {
    pub fn with_adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapter = Some(adapter.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Check value ranges before anything is sent
    pub fn validate(&self) -> Result<()> {
        if let Some(adapter) = &self.adapter {
            if adapter.trim().is_empty() {
                return Err(FanoutError::invalid_input("adapter name must not be blank"));
            }
        }

        if self.max_tokens == Some(0) {
            return Err(FanoutError::invalid_input("max_tokens must be positive"));
        }

        if let Some(temperature) = self.temperature {
            if !temperature.is_finite() || temperature < 0.0 {
                return Err(FanoutError::invalid_input(format!(
                    "temperature must be a non-negative number, got {}",
                    temperature
                )));
            }
        }

        if let Some(top_p) = self.top_p {
            if !top_p.is_finite() || top_p <= 0.0 || top_p > 1.0 {
                return Err(FanoutError::invalid_input(format!(
                    "top_p must be in (0, 1], got {}",
                    top_p
                )));
            }
        }

        Ok(())
    }

    /// Wire request for one partition
    pub fn to_request(&self, items: Vec<String>) -> BatchInferenceRequest {
        BatchInferenceRequest {
            list_messages: items,
            lora_adapter: self.adapter.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}
