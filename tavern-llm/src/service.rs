use std::sync::Arc;

use futures::StreamExt;

use crate::chunk::{ChunkRecord, ResponseAccumulator};
use crate::client::InferenceBackend;
use crate::error::LlmError;
use crate::types::{
    ChunkStream, ConnectionStatus, GenerationRequest, GenerationResult, ModelDescriptor,
    PullStream,
};

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TOP_P: f32 = 0.9;
const DEFAULT_TOP_K: u32 = 40;

/// Generation surface consumed by route handlers.
///
/// Wraps an [`InferenceBackend`], resolves sampling and model defaults,
/// and enforces the precondition that a model must be available before a
/// generation request is issued upstream. The backend is injected at
/// construction so tests can substitute a fake transport.
#[derive(Clone)]
pub struct LlmService {
    backend: Arc<dyn InferenceBackend>,
    default_model: String,
}

impl LlmService {
    pub fn new(backend: Arc<dyn InferenceBackend>, default_model: impl Into<String>) -> Self {
        Self {
            backend,
            default_model: default_model.into(),
        }
    }

    /// Model used when a request names none.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    fn resolve(&self, mut request: GenerationRequest) -> GenerationRequest {
        request.model = Some(
            request
                .model
                .unwrap_or_else(|| self.default_model.clone()),
        );
        let opts = &mut request.options;
        opts.temperature = Some(opts.temperature.unwrap_or(DEFAULT_TEMPERATURE));
        opts.top_p = Some(opts.top_p.unwrap_or(DEFAULT_TOP_P));
        opts.top_k = Some(opts.top_k.unwrap_or(DEFAULT_TOP_K));
        request
    }

    async fn ensure_available(&self, model: &str) -> Result<(), LlmError> {
        if self.model_available(model).await {
            Ok(())
        } else {
            Err(LlmError::ModelUnavailable(model.to_string()))
        }
    }

    /// Probe the inference service. Never errors.
    pub async fn test_connection(&self) -> ConnectionStatus {
        self.backend.test_connection().await
    }

    /// Full model listing, propagating transport failure.
    pub async fn list_models(&self) -> Result<Vec<ModelDescriptor>, LlmError> {
        self.backend.list_models().await
    }

    /// Whether `name` is present on the service.
    ///
    /// Degrades to `false` when the listing call itself fails: this
    /// gates a precondition, so an unreachable service simply means
    /// nothing is available.
    pub async fn model_available(&self, name: &str) -> bool {
        match self.backend.list_models().await {
            Ok(models) => models
                .iter()
                .any(|m| m.name == name || m.name.strip_suffix(":latest") == Some(name)),
            Err(e) => {
                tracing::warn!(error = %e, model = %name, "model listing failed");
                false
            }
        }
    }

    /// Non-streaming generation with resolved defaults and the
    /// availability precondition applied.
    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, LlmError> {
        let request = self.resolve(request);
        let model = request.model.clone().unwrap_or_default();
        self.ensure_available(&model).await?;
        self.backend.generate(request).await
    }

    /// Streaming generation; same precondition as [`generate`](Self::generate).
    pub async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<ChunkStream, LlmError> {
        let request = self.resolve(request);
        let model = request.model.clone().unwrap_or_default();
        self.ensure_available(&model).await?;
        self.backend.generate_stream(request).await
    }

    /// Streaming generation driven to completion, invoking `on_chunk`
    /// for every record carrying a non-empty fragment, in arrival order.
    ///
    /// Resolves with the accumulated result once the upstream stream
    /// signals completion or closes. A transport error mid-stream fails
    /// the whole operation; fragments already delivered stand, and
    /// `on_chunk` is never invoked after the failure.
    pub async fn generate_stream_with<F>(
        &self,
        request: GenerationRequest,
        mut on_chunk: F,
    ) -> Result<GenerationResult, LlmError>
    where
        F: FnMut(&str, &ChunkRecord) + Send,
    {
        let request = self.resolve(request);
        let model = request.model.clone().unwrap_or_default();
        self.ensure_available(&model).await?;
        let mut stream = self.backend.generate_stream(request).await?;
        let mut acc = ResponseAccumulator::new();
        while let Some(next) = stream.next().await {
            let record = next?;
            if let Some(fragment) = record.response.as_deref() {
                if !fragment.is_empty() {
                    on_chunk(fragment, &record);
                }
            }
            acc.fold(&record);
        }
        let (response, context, reported_model) = acc.into_parts();
        Ok(GenerationResult {
            response,
            context,
            model: reported_model.unwrap_or(model),
            created_at: chrono::Utc::now(),
        })
    }

    /// Embedding vector for `text`; the configured default model is
    /// used when none is named.
    pub async fn embeddings(
        &self,
        text: &str,
        model: Option<&str>,
    ) -> Result<Vec<f32>, LlmError> {
        let model = model.unwrap_or(&self.default_model);
        self.backend.embeddings(text, model).await
    }

    /// Pull `name`, streaming progress events.
    pub async fn pull_model(&self, name: &str) -> Result<PullStream, LlmError> {
        self.backend.pull_model(name).await
    }

    /// Delete `name` from the service.
    pub async fn delete_model(&self, name: &str) -> Result<(), LlmError> {
        self.backend.delete_model(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PullEvent, PullOutcome};
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend fake that records calls and replays scripted streams.
    #[derive(Default)]
    struct FakeBackend {
        models: Vec<&'static str>,
        listing_fails: bool,
        stream_items: Mutex<Vec<Result<ChunkRecord, &'static str>>>,
        generate_calls: AtomicUsize,
        last_request: Mutex<Option<GenerationRequest>>,
    }

    #[async_trait]
    impl InferenceBackend for FakeBackend {
        async fn test_connection(&self) -> ConnectionStatus {
            ConnectionStatus {
                success: true,
                models: Vec::new(),
                error: None,
            }
        }

        async fn list_models(&self) -> Result<Vec<ModelDescriptor>, LlmError> {
            if self.listing_fails {
                return Err(LlmError::Protocol("listing down".into()));
            }
            Ok(self
                .models
                .iter()
                .map(|name| ModelDescriptor {
                    name: name.to_string(),
                    size: None,
                    modified_at: None,
                    digest: None,
                })
                .collect())
        }

        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResult, LlmError> {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            let model = request.model.clone().unwrap_or_default();
            *self.last_request.lock().unwrap() = Some(request);
            Ok(GenerationResult {
                response: "ok".into(),
                context: Some(vec![1]),
                model,
                created_at: chrono::Utc::now(),
            })
        }

        async fn generate_stream(
            &self,
            request: GenerationRequest,
        ) -> Result<ChunkStream, LlmError> {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request);
            let items: Vec<Result<ChunkRecord, LlmError>> = self
                .stream_items
                .lock()
                .unwrap()
                .drain(..)
                .map(|item| item.map_err(|msg| LlmError::Protocol(msg.into())))
                .collect();
            Ok(stream::iter(items).boxed())
        }

        async fn embeddings(&self, _text: &str, _model: &str) -> Result<Vec<f32>, LlmError> {
            Ok(vec![0.0])
        }

        async fn pull_model(&self, _name: &str) -> Result<PullStream, LlmError> {
            Ok(stream::iter(vec![Ok(PullEvent::Done(PullOutcome::Completed))]).boxed())
        }

        async fn delete_model(&self, _name: &str) -> Result<(), LlmError> {
            Ok(())
        }
    }

    fn fragment(text: &str) -> Result<ChunkRecord, &'static str> {
        Ok(ChunkRecord {
            response: Some(text.to_string()),
            ..Default::default()
        })
    }

    fn service_with(backend: FakeBackend) -> (LlmService, Arc<FakeBackend>) {
        let backend = Arc::new(backend);
        (
            LlmService::new(backend.clone(), "llama3"),
            backend,
        )
    }

    #[tokio::test]
    async fn unavailable_model_fails_before_any_generation_call() {
        let (service, backend) = service_with(FakeBackend {
            models: vec!["llama3"],
            ..Default::default()
        });
        let err = service
            .generate(GenerationRequest {
                prompt: "hi".into(),
                model: Some("missing".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ModelUnavailable(name) if name == "missing"));
        assert_eq!(backend.generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn defaults_are_resolved_onto_the_request() {
        let (service, backend) = service_with(FakeBackend {
            models: vec!["llama3"],
            ..Default::default()
        });
        let result = service.generate(GenerationRequest::new("hi")).await.unwrap();
        assert_eq!(result.model, "llama3");
        let sent = backend.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(sent.model.as_deref(), Some("llama3"));
        assert_eq!(sent.options.temperature, Some(0.7));
        assert_eq!(sent.options.top_p, Some(0.9));
        assert_eq!(sent.options.top_k, Some(40));
    }

    #[tokio::test]
    async fn caller_sampling_overrides_survive_resolution() {
        let (service, backend) = service_with(FakeBackend {
            models: vec!["llama3"],
            ..Default::default()
        });
        let mut request = GenerationRequest::new("hi");
        request.options.temperature = Some(1.5);
        service.generate(request).await.unwrap();
        let sent = backend.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(sent.options.temperature, Some(1.5));
        assert_eq!(sent.options.top_k, Some(40));
    }

    #[tokio::test]
    async fn latest_tag_counts_as_available() {
        let (service, _) = service_with(FakeBackend {
            models: vec!["llama3:latest"],
            ..Default::default()
        });
        assert!(service.model_available("llama3").await);
        assert!(service.model_available("llama3:latest").await);
        assert!(!service.model_available("mistral").await);
    }

    #[tokio::test]
    async fn availability_degrades_to_false_when_listing_fails() {
        let (service, _) = service_with(FakeBackend {
            listing_fails: true,
            ..Default::default()
        });
        assert!(!service.model_available("anything").await);
    }

    #[tokio::test]
    async fn stream_callback_order_matches_record_order() {
        let (service, _) = service_with(FakeBackend {
            models: vec!["llama3"],
            stream_items: Mutex::new(vec![
                fragment("alpha "),
                fragment("beta "),
                Ok(ChunkRecord {
                    response: Some("gamma".into()),
                    done: true,
                    context: Some(vec![4, 2]),
                    model: Some("llama3".into()),
                }),
            ]),
            ..Default::default()
        });
        let mut seen = Vec::new();
        let result = service
            .generate_stream_with(GenerationRequest::new("hi"), |fragment, _| {
                seen.push(fragment.to_string());
            })
            .await
            .unwrap();
        assert_eq!(seen, vec!["alpha ", "beta ", "gamma"]);
        assert_eq!(result.response, "alpha beta gamma");
        assert_eq!(result.context, Some(vec![4, 2]));
        assert_eq!(result.model, "llama3");
    }

    #[tokio::test]
    async fn no_callbacks_fire_after_a_mid_stream_failure() {
        let (service, _) = service_with(FakeBackend {
            models: vec!["llama3"],
            stream_items: Mutex::new(vec![
                fragment("partial "),
                Err("connection reset"),
                fragment("never delivered"),
            ]),
            ..Default::default()
        });
        let mut seen = Vec::new();
        let err = service
            .generate_stream_with(GenerationRequest::new("hi"), |fragment, _| {
                seen.push(fragment.to_string());
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Protocol(_)));
        assert_eq!(seen, vec!["partial "]);
    }

    #[tokio::test]
    async fn stream_without_done_record_still_resolves() {
        let (service, _) = service_with(FakeBackend {
            models: vec!["llama3"],
            stream_items: Mutex::new(vec![fragment("cut "), fragment("short")]),
            ..Default::default()
        });
        let result = service
            .generate_stream_with(GenerationRequest::new("hi"), |_, _| {})
            .await
            .unwrap();
        assert_eq!(result.response, "cut short");
        assert_eq!(result.context, None);
        // Falls back to the resolved model when the stream named none.
        assert_eq!(result.model, "llama3");
    }
}
