use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tavern_llm::{GenerationRequest, LlmService, SamplingOptions};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Assistant message substituted when generation fails, so a user turn
/// is never left without a reply.
pub const FALLBACK_REPLY: &str =
    "Sorry, I had trouble generating a response. Please try again.";

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Answer concisely and accurately.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One transcript entry.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn now(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// AI persona attached to a chat: display name, instructions and
/// optional sampling/model overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPersona {
    pub name: String,
    pub system_prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub options: SamplingOptions,
}

/// A conversation and its carried generation context.
#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    pub id: Uuid,
    pub owner: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentPersona>,
    pub messages: Vec<ChatMessage>,
    /// Context token from the last completed turn, replayed verbatim.
    #[serde(skip)]
    context: Option<Vec<i64>>,
}

/// Failures from the chat surface; generation failures never appear
/// here, they are absorbed into the transcript as [`FALLBACK_REPLY`].
#[derive(Debug, PartialEq, Eq)]
pub enum ChatError {
    NotFound,
    Forbidden,
}

/// In-memory chat registry plus the conversational bridge.
///
/// Persistence is an external collaborator of the platform; this store
/// keeps just enough state for the message route to be a real route.
pub struct ChatService {
    llm: LlmService,
    chats: RwLock<HashMap<Uuid, Chat>>,
}

impl ChatService {
    pub fn new(llm: LlmService) -> Self {
        Self {
            llm,
            chats: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create_chat(
        &self,
        owner: Uuid,
        title: impl Into<String>,
        agent: Option<AgentPersona>,
    ) -> Chat {
        let chat = Chat {
            id: Uuid::new_v4(),
            owner,
            title: title.into(),
            agent,
            messages: Vec::new(),
            context: None,
        };
        self.chats.write().await.insert(chat.id, chat.clone());
        tracing::debug!(chat = %chat.id, "chat created");
        chat
    }

    pub async fn get_chat(&self, id: Uuid, caller: Uuid) -> Result<Chat, ChatError> {
        let chats = self.chats.read().await;
        let chat = chats.get(&id).ok_or(ChatError::NotFound)?;
        if chat.owner != caller {
            return Err(ChatError::Forbidden);
        }
        Ok(chat.clone())
    }

    /// Append the user message and synchronously produce the assistant
    /// reply for the same response cycle (store-and-wait).
    ///
    /// On success the assistant message carries the generated text
    /// verbatim and the chat's context token advances; on any
    /// generation failure the real error is logged and the fixed
    /// [`FALLBACK_REPLY`] is appended instead, so the turn always ends
    /// with an assistant entry.
    pub async fn post_message(
        &self,
        chat_id: Uuid,
        caller: Uuid,
        content: String,
    ) -> Result<Chat, ChatError> {
        let (agent, context) = {
            let mut chats = self.chats.write().await;
            let chat = chats.get_mut(&chat_id).ok_or(ChatError::NotFound)?;
            if chat.owner != caller {
                return Err(ChatError::Forbidden);
            }
            chat.messages
                .push(ChatMessage::now(MessageRole::User, &content));
            (chat.agent.clone(), chat.context.clone())
        };

        let request = build_request(content, agent.as_ref(), context);
        let reply = self.llm.generate(request).await;

        let mut chats = self.chats.write().await;
        let chat = chats.get_mut(&chat_id).ok_or(ChatError::NotFound)?;
        match reply {
            Ok(result) => {
                chat.messages
                    .push(ChatMessage::now(MessageRole::Assistant, result.response));
                chat.context = result.context;
            }
            Err(e) => {
                tracing::warn!(chat = %chat_id, error = %e, "generation failed, using fallback reply");
                chat.messages
                    .push(ChatMessage::now(MessageRole::Assistant, FALLBACK_REPLY));
            }
        }
        Ok(chat.clone())
    }
}

fn build_request(
    prompt: String,
    agent: Option<&AgentPersona>,
    context: Option<Vec<i64>>,
) -> GenerationRequest {
    let system = match agent {
        Some(a) if !a.system_prompt.is_empty() => {
            format!("You are {}. {}", a.name, a.system_prompt)
        }
        Some(a) => format!("You are {}. {DEFAULT_SYSTEM_PROMPT}", a.name),
        None => DEFAULT_SYSTEM_PROMPT.to_string(),
    };
    GenerationRequest {
        prompt,
        model: agent.and_then(|a| a.model.clone()),
        system: Some(system),
        context,
        options: agent.map(|a| a.options).unwrap_or_default(),
    }
}
