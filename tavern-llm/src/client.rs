use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use crate::chunk::{ChunkDecoder, ChunkRecord, PullProgress};
use crate::config::OllamaConfig;
use crate::error::LlmError;
use crate::types::{
    ChunkStream, ConnectionStatus, GenerationRequest, GenerationResult, ModelDescriptor,
    PullEvent, PullOutcome, PullStream,
};

/// Timeout for the connectivity probe and model listing calls.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for model pulls, which download gigabytes on a cold cache.
const PULL_TIMEOUT: Duration = Duration::from_secs(300);

/// Raw transport operations against an inference service.
///
/// Implemented by [`OllamaClient`] for the real service; tests swap in
/// fakes. Availability preconditions and option defaults live one layer
/// up in [`LlmService`](crate::LlmService).
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Probe the service. Never errors; failures fold into the status.
    async fn test_connection(&self) -> ConnectionStatus;

    /// Fetch the model list, propagating transport failures.
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, LlmError>;

    /// Single-shot generation.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResult, LlmError>;

    /// Streaming generation. Records arrive strictly in upstream order;
    /// the stream ends after the `done` record or an error item.
    async fn generate_stream(&self, request: GenerationRequest) -> Result<ChunkStream, LlmError>;

    /// Embedding vector for `text` using `model`.
    async fn embeddings(&self, text: &str, model: &str) -> Result<Vec<f32>, LlmError>;

    /// Pull a model, streaming progress. Ends with [`PullEvent::Done`].
    async fn pull_model(&self, name: &str) -> Result<PullStream, LlmError>;

    /// Remove a model from the service.
    async fn delete_model(&self, name: &str) -> Result<(), LlmError>;
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelDescriptor>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// HTTP client for an Ollama-style inference service.
///
/// Holds only a connection pool and the configuration fixed at
/// construction; no state is carried between calls, so concurrent
/// requests are fully independent.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn generate_body(&self, request: &GenerationRequest, stream: bool) -> serde_json::Value {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());
        let mut body = json!({
            "model": model,
            "prompt": request.prompt,
            "stream": stream,
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        if let Some(context) = &request.context {
            body["context"] = json!(context);
        }
        let mut options = serde_json::Map::new();
        if let Some(t) = request.options.temperature {
            options.insert("temperature".into(), json!(t));
        }
        if let Some(p) = request.options.top_p {
            options.insert("top_p".into(), json!(p));
        }
        if let Some(k) = request.options.top_k {
            options.insert("top_k".into(), json!(k));
        }
        if !options.is_empty() {
            body["options"] = serde_json::Value::Object(options);
        }
        body
    }

    async fn fetch_tags(&self) -> Result<Vec<ModelDescriptor>, LlmError> {
        let resp = self
            .http
            .get(self.endpoint("/api/tags"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        let text = resp.text().await?;
        let tags: TagsResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::Protocol(format!("invalid model listing: {e}")))?;
        Ok(tags.models)
    }
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    async fn test_connection(&self) -> ConnectionStatus {
        match self.fetch_tags().await {
            Ok(models) => ConnectionStatus {
                success: true,
                models,
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "inference service probe failed");
                ConnectionStatus {
                    success: false,
                    models: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, LlmError> {
        self.fetch_tags().await
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResult, LlmError> {
        let requested_model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());
        let body = self.generate_body(&request, false);
        tracing::debug!(model = %requested_model, "generate request");
        let resp = self
            .http
            .post(self.endpoint("/api/generate"))
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let text = resp.text().await?;
        let record: ChunkRecord = serde_json::from_str(&text)
            .map_err(|e| LlmError::Protocol(format!("invalid generation response: {e}")))?;
        Ok(GenerationResult {
            response: record.response.unwrap_or_default(),
            context: record.context,
            model: record.model.unwrap_or(requested_model),
            created_at: chrono::Utc::now(),
        })
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<ChunkStream, LlmError> {
        let body = self.generate_body(&request, true);
        let resp = self
            .http
            .post(self.endpoint("/api/generate"))
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let mut bytes = resp.bytes_stream();
        let stream = async_stream::stream! {
            let mut decoder = ChunkDecoder::new();
            while let Some(next) = bytes.next().await {
                match next {
                    Ok(chunk) => {
                        for record in decoder.push::<ChunkRecord>(&chunk) {
                            let done = record.done;
                            yield Ok(record);
                            if done {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(LlmError::Transport(e));
                        return;
                    }
                }
            }
            // Upstream closed without a newline after the last record.
            if let Some(record) = decoder.finish::<ChunkRecord>() {
                yield Ok(record);
            }
        };
        Ok(stream.boxed())
    }

    async fn embeddings(&self, text: &str, model: &str) -> Result<Vec<f32>, LlmError> {
        let body = json!({ "model": model, "prompt": text });
        let resp = self
            .http
            .post(self.endpoint("/api/embeddings"))
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let text = resp.text().await?;
        let parsed: EmbeddingsResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::Protocol(format!("invalid embeddings response: {e}")))?;
        Ok(parsed.embedding)
    }

    async fn pull_model(&self, name: &str) -> Result<PullStream, LlmError> {
        let body = json!({ "name": name, "stream": true });
        tracing::info!(model = %name, "pulling model");
        let resp = self
            .http
            .post(self.endpoint("/api/pull"))
            .timeout(PULL_TIMEOUT)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let mut bytes = resp.bytes_stream();
        let stream = async_stream::stream! {
            let mut decoder = ChunkDecoder::new();
            let mut confirmed = false;
            while let Some(next) = bytes.next().await {
                match next {
                    Ok(chunk) => {
                        for progress in decoder.push::<PullProgress>(&chunk) {
                            if progress.status == "success" {
                                confirmed = true;
                            }
                            yield Ok(PullEvent::Progress(progress));
                        }
                    }
                    Err(e) => {
                        yield Err(LlmError::Transport(e));
                        return;
                    }
                }
            }
            if let Some(progress) = decoder.finish::<PullProgress>() {
                if progress.status == "success" {
                    confirmed = true;
                }
                yield Ok(PullEvent::Progress(progress));
            }
            let outcome = if confirmed {
                PullOutcome::Completed
            } else {
                // The stream ended without a terminal status; report that
                // distinctly so callers can re-verify availability.
                PullOutcome::CompletedUnconfirmed
            };
            yield Ok(PullEvent::Done(outcome));
        };
        Ok(stream.boxed())
    }

    async fn delete_model(&self, name: &str) -> Result<(), LlmError> {
        let body = json!({ "name": name });
        self.http
            .delete(self.endpoint("/api/delete"))
            .timeout(PROBE_TIMEOUT)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        tracing::info!(model = %name, "model deleted");
        Ok(())
    }
}
