//! LLM proxy core for the `tavern` chat platform.
//!
//! This crate talks to an Ollama-style inference service over HTTP and
//! exposes [`LlmService`], the generation surface consumed by route
//! handlers: non-streaming and streaming generation, embeddings, model
//! management and availability checks.

mod chunk;
mod client;
mod config;
mod error;
mod service;
mod types;

pub use chunk::{ChunkDecoder, ChunkRecord, PullProgress, ResponseAccumulator};
pub use client::{InferenceBackend, OllamaClient};
pub use config::OllamaConfig;
pub use error::LlmError;
pub use service::LlmService;
pub use types::{
    ChunkStream, ConnectionStatus, GenerationRequest, GenerationResult, ModelDescriptor,
    PullEvent, PullOutcome, PullStream, SamplingOptions,
};
