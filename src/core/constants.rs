//! Process-wide defaults used when no configuration file overrides them.

/// Title given to chats created without an explicit title.
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

/// Model requested when neither the chat config nor the defaults file names
/// one.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-pro";

/// Default completion ceiling. Generous on purpose; providers clamp it.
pub const DEFAULT_MAX_TOKENS: u32 = 1_048_576;

pub const DEFAULT_TEMPERATURE: f32 = 1.0;
pub const DEFAULT_TOP_P: f32 = 0.9;
pub const DEFAULT_PRESENCE_PENALTY: f32 = 0.0;
pub const DEFAULT_FREQUENCY_PENALTY: f32 = 0.0;

/// Outbound history budget in approximate tokens. Sufficient for almost all
/// current models; whole messages are dropped oldest-first to stay under it.
pub const DEFAULT_TOKEN_BUDGET: usize = 256_000;

/// Base URL used when the defaults file does not name one.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Rough bytes-per-token ratio used by the budget estimate. The trimming
/// policy only ever drops whole messages, so precision is not critical.
pub const APPROX_BYTES_PER_TOKEN: usize = 4;

/// Flat token cost attributed to an attached image when estimating budget.
pub const APPROX_IMAGE_TOKENS: usize = 512;
