use serde::{Deserialize, Serialize};

use crate::core::constants::{
    DEFAULT_CHAT_TITLE, DEFAULT_FREQUENCY_PENALTY, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    DEFAULT_PRESENCE_PENALTY, DEFAULT_TEMPERATURE, DEFAULT_TOP_P,
};
use crate::core::message::{ImageDetail, Message, Role};
use crate::utils::id::new_id;

/// Sampling parameters sent with every request for a chat.
///
/// Copied by value into each chat at creation so editing one chat's config
/// never affects another's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            presence_penalty: DEFAULT_PRESENCE_PENALTY,
            frequency_penalty: DEFAULT_FREQUENCY_PENALTY,
        }
    }
}

/// Process-wide defaults applied when creating a chat. Derived from the
/// defaults file (see [`crate::core::config`]) or from built-in constants.
#[derive(Debug, Clone, Default)]
pub struct ChatDefaults {
    /// Seeded as a leading system message when non-empty.
    pub system_message: String,
    pub config: GenerationConfig,
    pub image_detail: ImageDetail,
}

/// An ordered conversation plus its per-chat generation config and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    /// True once the user names the chat; derivative titling is skipped then.
    pub title_is_user_set: bool,
    pub messages: Vec<Message>,
    pub config: GenerationConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default)]
    pub image_detail_default: ImageDetail,
}

impl Chat {
    /// Create a chat with a fresh id and the process-wide defaults copied by
    /// value. A leading system message is seeded only when the configured
    /// default system message is non-empty. An absent title falls back to
    /// [`DEFAULT_CHAT_TITLE`].
    pub fn new(title: Option<&str>, folder: Option<String>, defaults: &ChatDefaults) -> Self {
        let messages = if defaults.system_message.is_empty() {
            Vec::new()
        } else {
            vec![Message::text(Role::System, defaults.system_message.clone())]
        };

        Self {
            id: new_id(),
            title: title.unwrap_or(DEFAULT_CHAT_TITLE).to_string(),
            // Even an explicit title starts out unset; the flag flips when
            // the user renames the chat, which suppresses derivative titling.
            title_is_user_set: false,
            messages,
            config: defaults.config.clone(),
            folder,
            image_detail_default: defaults.image_detail,
        }
    }
}

/// The full set of chats plus an explicit current-chat selector.
///
/// Invariant: `current_index < chats.len()` whenever `chats` is non-empty.
/// An empty collection is a valid transient state only during
/// initialization; [`ChatCollection::repair_if_empty`] restores the
/// invariant by creating a default chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatCollection {
    pub chats: Vec<Chat>,
    pub current_index: usize,
}

impl ChatCollection {
    /// A collection holding a single freshly created chat.
    pub fn with_default_chat(defaults: &ChatDefaults) -> Self {
        Self {
            chats: vec![Chat::new(None, None, defaults)],
            current_index: 0,
        }
    }

    /// Create a default chat if the collection is empty. Returns a new
    /// collection; the receiver is left untouched.
    pub fn repair_if_empty(&self, defaults: &ChatDefaults) -> Self {
        if self.chats.is_empty() {
            Self::with_default_chat(defaults)
        } else {
            self.clone()
        }
    }

    /// The currently selected chat, if any exist.
    pub fn current(&self) -> Option<&Chat> {
        self.chats.get(self.current_index)
    }

    /// Return a copy with the current-chat selector moved to `index`.
    ///
    /// Out-of-range selection is a programming error: the presentation
    /// collaborator only offers indices it read from this collection.
    pub fn set_current(&self, index: usize) -> Self {
        assert!(
            index < self.chats.len(),
            "current chat index {index} out of range ({} chats)",
            self.chats.len()
        );
        let mut next = self.clone();
        next.current_index = index;
        next
    }

    /// Look up a chat by id, with its position.
    pub fn chat_by_id(&self, id: &str) -> Option<(usize, &Chat)> {
        self.chats
            .iter()
            .enumerate()
            .find(|(_, chat)| chat.id == id)
    }
}
