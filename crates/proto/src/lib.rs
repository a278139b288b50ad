//! Fanout worker protocol
//!
//! JSON request/response types spoken between the coordinator and the
//! inference workers it fans batches out to.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// Path of the readiness endpoint on every worker
pub const HEALTH_PATH: &str = "/health";

/// Path of the batch inference endpoint on every worker
pub const INFERENCE_PATH: &str = "/inference";

// Health check
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Whether the worker's engine is loaded and accepting batches.
    /// A body without this field is treated as not ready. Numbers and
    /// strings count by truthiness, so `1` and `"yes"` mean ready.
    #[serde(default, deserialize_with = "truthy")]
    pub engine_ready: bool,
}

/// Readiness flag as workers may send it
#[derive(Deserialize)]
#[serde(untagged)]
enum Truthy {
    Bool(bool),
    Number(f64),
    Text(String),
    Null,
    Other(IgnoredAny),
}

fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Truthy::deserialize(deserializer)? {
        Truthy::Bool(flag) => flag,
        Truthy::Number(n) => n != 0.0,
        Truthy::Text(text) => !text.is_empty(),
        Truthy::Null | Truthy::Other(_) => false,
    })
}

// Batch inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchInferenceRequest {
    /// Ordered work items for this partition
    pub list_messages: Vec<String>,

    /// LoRA adapter to apply, if any
    pub lora_adapter: Option<String>,

    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchInferenceResponse {
    /// One result per submitted item, in submission order
    pub responses: Vec<String>,

    /// Adapter the worker actually used
    #[serde(default)]
    pub lora_adapter_used: Option<String>,
}
