//! Wire payloads for the OpenAI-compatible completions API, plus the
//! builder that turns a [`Chat`] into a budget-trimmed streaming request.

use serde::{Deserialize, Serialize};

use crate::core::budget::reduce_to_budget;
use crate::core::chat::Chat;
use crate::core::message::{ContentBlock, ImageDetail, Message, Role};

/// One part of an outbound message's `content` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiImageUrl {
    pub url: String,
    pub detail: ImageDetail,
}

/// An outbound conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiMessage {
    pub role: Role,
    pub content: Vec<ApiContentPart>,
}

impl From<&Message> for ApiMessage {
    fn from(message: &Message) -> Self {
        let content = message
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => ApiContentPart::Text { text: text.clone() },
                ContentBlock::Image { url, detail } => ApiContentPart::ImageUrl {
                    image_url: ApiImageUrl {
                        url: url.clone(),
                        detail: *detail,
                    },
                },
            })
            .collect();
        Self {
            role: message.role,
            content,
        }
    }
}

/// The streaming request body. Config fields ride alongside the trimmed
/// message list.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub stream: bool,
}

/// Build the outbound request for `chat`, applying the whole-message budget
/// trim first. `reasoning_text` never leaves the process.
pub fn build_chat_request(chat: &Chat, token_budget: usize) -> ChatRequest {
    let trimmed = reduce_to_budget(&chat.messages, token_budget);
    ChatRequest {
        model: chat.config.model.clone(),
        messages: trimmed.iter().map(ApiMessage::from).collect(),
        max_tokens: chat.config.max_tokens,
        temperature: chat.config.temperature,
        top_p: chat.config.top_p,
        presence_penalty: chat.config.presence_penalty,
        frequency_penalty: chat.config.frequency_penalty,
        stream: true,
    }
}

/// The incremental delta carried by one streamed choice. Only `content` and
/// `reasoning` are consumed by the engine; `role` is informational.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponseDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponseChoice {
    pub delta: ChatResponseDelta,
    /// Informational only; no state transition depends on it.
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub native_finish_reason: Option<String>,
}

/// One structured streamed event. A payload with zero choices is valid
/// keep-alive traffic and folds to nothing.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatResponseChoice>,
}
