use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Path;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tavern_llm::{GenerationRequest, LlmService, PullEvent, PullOutcome, SamplingOptions};

use crate::auth::{AdminUser, AuthUser};
use crate::error::ApiError;

/// Generation request as posted by clients.
#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub context: Option<Vec<i64>>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub stream: bool,
}

impl GenerateBody {
    fn into_request(self) -> GenerationRequest {
        GenerationRequest {
            prompt: self.prompt,
            model: self.model,
            system: self.system,
            context: self.context,
            options: SamplingOptions {
                temperature: self.temperature,
                top_p: self.top_p,
                top_k: self.top_k,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingsBody {
    pub text: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PullBody {
    pub model: String,
}

/// HTTP surface of the generation service.
///
/// Model management routes require an admin caller; the role guard
/// rejects before any upstream request is issued.
#[derive(Clone)]
pub struct LlmApi {
    llm: LlmService,
}

impl LlmApi {
    pub fn new(llm: LlmService) -> Self {
        Self { llm }
    }

    /// Build a router exposing the `/api/llm` routes.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route(
                "/api/llm/status",
                get({
                    let this = self.clone();
                    move || {
                        let this = this.clone();
                        async move { Json(this.llm.test_connection().await) }
                    }
                }),
            )
            .route(
                "/api/llm/models",
                get({
                    let this = self.clone();
                    move |_user: AuthUser| {
                        let this = this.clone();
                        async move { this.list_models().await }
                    }
                }),
            )
            .route(
                "/api/llm/models/:name/available",
                get({
                    let this = self.clone();
                    move |_user: AuthUser, Path(name): Path<String>| {
                        let this = this.clone();
                        async move {
                            let available = this.llm.model_available(&name).await;
                            Json(json!({
                                "success": true,
                                "model": name,
                                "available": available,
                            }))
                        }
                    }
                }),
            )
            .route(
                "/api/llm/generate",
                post({
                    let this = self.clone();
                    move |_user: AuthUser, Json(body): Json<GenerateBody>| {
                        let this = this.clone();
                        async move { this.generate(body).await }
                    }
                }),
            )
            .route(
                "/api/llm/embeddings",
                post({
                    let this = self.clone();
                    move |_user: AuthUser, Json(body): Json<EmbeddingsBody>| {
                        let this = this.clone();
                        async move { this.embeddings(body).await }
                    }
                }),
            )
            .route(
                "/api/llm/models/pull",
                post({
                    let this = self.clone();
                    move |_admin: AdminUser, Json(body): Json<PullBody>| {
                        let this = this.clone();
                        async move { this.pull(body).await }
                    }
                }),
            )
            .route(
                "/api/llm/models/:name",
                delete({
                    let this = self.clone();
                    move |_admin: AdminUser, Path(name): Path<String>| {
                        let this = this.clone();
                        async move { this.delete(name).await }
                    }
                }),
            )
    }

    async fn list_models(&self) -> Result<Response, ApiError> {
        let models = self.llm.list_models().await?;
        Ok(Json(json!({ "success": true, "models": models })).into_response())
    }

    async fn generate(&self, body: GenerateBody) -> Result<Response, ApiError> {
        let stream_requested = body.stream;
        let request = body.into_request();
        if !stream_requested {
            let result = self.llm.generate(request).await?;
            return Ok(Json(json!({
                "success": true,
                "response": result.response,
                "context": result.context,
                "model": result.model,
                "created_at": result.created_at,
                "done": true,
            }))
            .into_response());
        }

        // Precondition failures surface as a structured JSON error
        // before any bytes of the event stream are committed.
        let mut records = self.llm.generate_stream(request).await?;
        let events = async_stream::stream! {
            while let Some(next) = records.next().await {
                match next {
                    Ok(record) => {
                        if let Some(fragment) = record.response.as_deref() {
                            if !fragment.is_empty() {
                                yield Ok::<Bytes, Infallible>(event_line(&json!({
                                    "type": "chunk",
                                    "content": fragment,
                                    "done": record.done,
                                })));
                            }
                        }
                        if record.done {
                            yield Ok(event_line(&json!({
                                "type": "done",
                                "context": record.context,
                                "model": record.model,
                            })));
                            return;
                        }
                    }
                    Err(e) => {
                        // Explicit error event rather than an abrupt close.
                        yield Ok(event_line(&json!({
                            "type": "error",
                            "message": e.to_string(),
                        })));
                        return;
                    }
                }
            }
            yield Ok(event_line(&json!({ "type": "done" })));
        };
        Ok(ndjson_response(Body::from_stream(events)))
    }

    async fn embeddings(&self, body: EmbeddingsBody) -> Result<Response, ApiError> {
        let model = body
            .model
            .unwrap_or_else(|| self.llm.default_model().to_string());
        let embeddings = self.llm.embeddings(&body.text, Some(&model)).await?;
        Ok(Json(json!({
            "success": true,
            "embeddings": embeddings,
            "model": model,
        }))
        .into_response())
    }

    async fn pull(&self, body: PullBody) -> Result<Response, ApiError> {
        let model = body.model;
        let mut progress = self.llm.pull_model(&model).await?;
        let events = async_stream::stream! {
            while let Some(next) = progress.next().await {
                match next {
                    Ok(PullEvent::Progress(p)) => {
                        yield Ok::<Bytes, Infallible>(event_line(
                            &serde_json::to_value(&p).unwrap_or_default(),
                        ));
                    }
                    Ok(PullEvent::Done(outcome)) => {
                        yield Ok(event_line(&json!({
                            "success": true,
                            "model": model,
                            "confirmed": outcome == PullOutcome::Completed,
                        })));
                        return;
                    }
                    Err(e) => {
                        yield Ok(event_line(&json!({
                            "success": false,
                            "error": e.to_string(),
                        })));
                        return;
                    }
                }
            }
        };
        Ok(ndjson_response(Body::from_stream(events)))
    }

    async fn delete(&self, name: String) -> Result<Response, ApiError> {
        self.llm.delete_model(&name).await?;
        Ok(Json(json!({
            "success": true,
            "message": format!("model '{name}' deleted"),
        }))
        .into_response())
    }
}

fn event_line(value: &serde_json::Value) -> Bytes {
    Bytes::from(format!("{value}\n"))
}

fn ndjson_response(body: Body) -> Response {
    Response::builder()
        .header(CONTENT_TYPE, "application/x-ndjson")
        .body(body)
        .unwrap()
}
