//! Shared fakes for route and bridge tests.

use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use tavern_llm::{
    ChunkRecord, ChunkStream, ConnectionStatus, GenerationRequest, GenerationResult,
    InferenceBackend, LlmError, ModelDescriptor, PullEvent, PullOutcome, PullStream,
};

/// Scriptable [`InferenceBackend`] counting calls and capturing the
/// last generation request.
pub struct FakeBackend {
    pub models: Vec<String>,
    /// Fixed non-streaming reply; `None` makes `generate` fail.
    pub reply: Option<String>,
    /// Items replayed by `generate_stream`; `Err` strings become
    /// protocol errors.
    pub stream_items: Mutex<Vec<Result<ChunkRecord, String>>>,
    /// Items replayed by `pull_model`.
    pub pull_items: Mutex<Vec<Result<PullEvent, String>>>,
    pub generate_calls: AtomicUsize,
    pub pull_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub last_request: Mutex<Option<GenerationRequest>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            models: vec!["llama3".to_string()],
            reply: Some("ok".to_string()),
            stream_items: Mutex::new(Vec::new()),
            pull_items: Mutex::new(vec![Ok(PullEvent::Done(PullOutcome::Completed))]),
            generate_calls: AtomicUsize::new(0),
            pull_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }
}

impl FakeBackend {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            ..Default::default()
        }
    }

    pub fn fragment(text: &str) -> Result<ChunkRecord, String> {
        Ok(ChunkRecord {
            response: Some(text.to_string()),
            ..Default::default()
        })
    }
}

#[async_trait]
impl InferenceBackend for FakeBackend {
    async fn test_connection(&self) -> ConnectionStatus {
        ConnectionStatus {
            success: true,
            models: self.descriptors(),
            error: None,
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, LlmError> {
        Ok(self.descriptors())
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResult, LlmError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let model = request.model.clone().unwrap_or_default();
        *self.last_request.lock().unwrap() = Some(request);
        match &self.reply {
            Some(text) => Ok(GenerationResult {
                response: text.clone(),
                context: Some(vec![10, 11]),
                model,
                created_at: chrono::Utc::now(),
            }),
            None => Err(LlmError::Protocol("upstream exploded".into())),
        }
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<ChunkStream, LlmError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        let items: Vec<Result<ChunkRecord, LlmError>> = self
            .stream_items
            .lock()
            .unwrap()
            .drain(..)
            .map(|item| item.map_err(LlmError::Protocol))
            .collect();
        Ok(stream::iter(items).boxed())
    }

    async fn embeddings(&self, _text: &str, _model: &str) -> Result<Vec<f32>, LlmError> {
        Ok(vec![0.25, -0.5])
    }

    async fn pull_model(&self, _name: &str) -> Result<PullStream, LlmError> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        let items: Vec<Result<PullEvent, LlmError>> = self
            .pull_items
            .lock()
            .unwrap()
            .drain(..)
            .map(|item| item.map_err(LlmError::Protocol))
            .collect();
        Ok(stream::iter(items).boxed())
    }

    async fn delete_model(&self, _name: &str) -> Result<(), LlmError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl FakeBackend {
    fn descriptors(&self) -> Vec<ModelDescriptor> {
        self.models
            .iter()
            .map(|name| ModelDescriptor {
                name: name.clone(),
                size: None,
                modified_at: None,
                digest: None,
            })
            .collect()
    }
}
