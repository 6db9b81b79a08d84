use serde::{Deserialize, Serialize};

use crate::utils::id::new_id;

/// Who authored a message. The engine never assumes any particular role
/// ordering beyond "the last message determines whose turn is next."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Resolution hint forwarded to image-capable endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    #[default]
    Auto,
    Low,
    High,
}

/// One unit of message content.
///
/// A message's content is an ordered sequence of blocks; by convention index
/// 0 is text (possibly empty) and subsequent entries are images. The order is
/// display order and is preserved across all mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { url: String, detail: ImageDetail },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>, detail: ImageDetail) -> Self {
        ContentBlock::Image {
            url: url.into(),
            detail,
        }
    }
}

/// A single conversation turn.
///
/// `reasoning_text` is populated only for assistant messages that streamed a
/// separate reasoning channel; it stays `None` otherwise. Absence and empty
/// string are distinct states and both survive serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_text: Option<String>,
}

impl Message {
    /// Wrap `text` as a single `Text` content block with a fresh id.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: vec![ContentBlock::text(text)],
            reasoning_text: None,
        }
    }

    /// Empty assistant message used as the streaming target before the first
    /// chunk arrives.
    pub fn assistant_placeholder() -> Self {
        Self::text(Role::Assistant, "")
    }

    /// The text of the first content block, if the message has one.
    pub fn text_content(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::Image { .. } => None,
        })
    }

    /// Append a fragment verbatim to the first `Text` block, creating it at
    /// index 0 if the message somehow has none.
    pub fn append_text(&mut self, fragment: &str) {
        for block in &mut self.content {
            if let ContentBlock::Text { text } = block {
                text.push_str(fragment);
                return;
            }
        }
        self.content.insert(0, ContentBlock::text(fragment));
    }

    /// Append a fragment verbatim to the reasoning channel, initializing it
    /// from empty if previously absent.
    pub fn append_reasoning(&mut self, fragment: &str) {
        self.reasoning_text
            .get_or_insert_with(String::new)
            .push_str(fragment);
    }
}
