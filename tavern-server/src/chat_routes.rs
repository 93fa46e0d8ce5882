use std::sync::Arc;

use axum::extract::Path;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::chat::{AgentPersona, ChatError, ChatService};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateChatBody {
    pub title: String,
    #[serde(default)]
    pub agent: Option<AgentPersona>,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub content: String,
}

/// Chat transcript routes; the message route is the call site of the
/// conversational bridge.
#[derive(Clone)]
pub struct ChatApi {
    chats: Arc<ChatService>,
}

impl ChatApi {
    pub fn new(chats: Arc<ChatService>) -> Self {
        Self { chats }
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route(
                "/api/chats",
                post({
                    let this = self.clone();
                    move |user: AuthUser, Json(body): Json<CreateChatBody>| {
                        let this = this.clone();
                        async move {
                            let chat =
                                this.chats.create_chat(user.id, body.title, body.agent).await;
                            Json(chat)
                        }
                    }
                }),
            )
            .route(
                "/api/chats/:id",
                get({
                    let this = self.clone();
                    move |user: AuthUser, Path(id): Path<Uuid>| {
                        let this = this.clone();
                        async move { this.get_chat(user, id).await }
                    }
                }),
            )
            .route(
                "/api/chats/:id/messages",
                post({
                    let this = self.clone();
                    move |user: AuthUser, Path(id): Path<Uuid>, Json(body): Json<MessageBody>| {
                        let this = this.clone();
                        async move { this.post_message(user, id, body).await }
                    }
                }),
            )
    }

    async fn get_chat(&self, user: AuthUser, id: Uuid) -> Result<Response, ApiError> {
        let chat = self.chats.get_chat(id, user.id).await.map_err(chat_error)?;
        Ok(Json(chat).into_response())
    }

    /// Append the user message and wait for the assistant reply in the
    /// same response cycle.
    async fn post_message(
        &self,
        user: AuthUser,
        id: Uuid,
        body: MessageBody,
    ) -> Result<Response, ApiError> {
        let chat = self
            .chats
            .post_message(id, user.id, body.content)
            .await
            .map_err(chat_error)?;
        Ok(Json(chat).into_response())
    }
}

fn chat_error(e: ChatError) -> ApiError {
    match e {
        ChatError::NotFound => ApiError::not_found("chat"),
        ChatError::Forbidden => ApiError::forbidden(),
    }
}
