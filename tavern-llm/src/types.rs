use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkRecord, PullProgress};
use crate::error::LlmError;

/// Stream of decoded generation records.
pub type ChunkStream = BoxStream<'static, Result<ChunkRecord, LlmError>>;

/// Stream of model-pull progress events, ending with [`PullEvent::Done`].
pub type PullStream = BoxStream<'static, Result<PullEvent, LlmError>>;

/// Sampling parameters forwarded to the inference service.
///
/// Unset fields fall back to the service defaults (temperature 0.7,
/// top_p 0.9, top_k 40) when the request is resolved.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SamplingOptions {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

/// One generation turn to forward to the inference service.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Model to generate with; the configured default when `None`.
    pub model: Option<String>,
    /// System prompt prepended by the inference service.
    pub system: Option<String>,
    /// Context token from the previous turn, replayed verbatim.
    pub context: Option<Vec<i64>>,
    pub options: SamplingOptions,
}

impl GenerationRequest {
    /// Request for `prompt` with everything else defaulted.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

/// Completed generation turn.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub response: String,
    /// Opaque context token to replay on the next turn.
    pub context: Option<Vec<i64>>,
    /// Model that produced the response.
    pub model: String,
    pub created_at: DateTime<Utc>,
}

/// Model entry as reported by the inference service listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
}

/// Outcome of the connectivity probe. Never an error: probe failures
/// fold into `success: false` with a message.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub success: bool,
    pub models: Vec<ModelDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Event yielded while pulling a model.
#[derive(Debug, Clone, PartialEq)]
pub enum PullEvent {
    /// One decoded progress record from the upstream pull stream.
    Progress(PullProgress),
    /// Terminal event; the stream ends after this.
    Done(PullOutcome),
}

/// How a model pull concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// The upstream stream carried an explicit `"success"` status.
    Completed,
    /// The stream ended without a terminal status. The download most
    /// likely succeeded, but callers wanting certainty should re-check
    /// availability.
    CompletedUnconfirmed,
}
