//! HTTP surface of the `tavern` chat platform.
//!
//! Exposes the LLM proxy routes backed by [`tavern_llm::LlmService`] and
//! the chat-message route whose handler bridges user messages to the
//! generation service.

pub mod args;
pub mod auth;
pub mod chat;
pub mod chat_routes;
pub mod error;
pub mod llm_routes;
pub mod logger;
#[cfg(test)]
pub mod test_helpers;

pub use chat::{ChatService, FALLBACK_REPLY};
pub use chat_routes::ChatApi;
pub use llm_routes::LlmApi;
