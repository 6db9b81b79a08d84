//! On-disk defaults for the engine.
//!
//! The engine itself persists nothing except this small TOML file of
//! process-wide defaults (model, system message, budget, endpoint).
//! Conversation data is the persistence collaborator's problem.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::core::chat::{ChatDefaults, GenerationConfig};
use crate::core::constants::{DEFAULT_BASE_URL, DEFAULT_TOKEN_BUDGET};
use crate::core::message::ImageDetail;

/// Errors that can occur when loading the defaults file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config at {}: {}", path.display(), source)
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

/// Optional overrides; anything absent falls back to the built-in constants.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    pub default_model: Option<String>,
    /// Seeded as a leading system message in every new chat when non-empty.
    pub default_system_message: Option<String>,
    pub base_url: Option<String>,
    /// Outbound history ceiling in approximate tokens.
    pub token_budget: Option<usize>,
    pub default_image_detail: Option<ImageDetail>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
}

impl Config {
    pub fn load() -> Result<Config, ConfigError> {
        Self::load_from_path(&Self::default_path())
    }

    pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self) -> Result<(), Box<dyn StdError>> {
        self.save_to_path(&Self::default_path())
    }

    /// Atomic save: written to a temp file in the target directory, then
    /// persisted over the destination.
    pub fn save_to_path(&self, path: &Path) -> Result<(), Box<dyn StdError>> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let contents = toml::to_string_pretty(self)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.persist(path)?;
        Ok(())
    }

    fn default_path() -> PathBuf {
        ProjectDirs::from("org", "colloquy", "colloquy")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// The per-chat defaults this config implies.
    pub fn chat_defaults(&self) -> ChatDefaults {
        let mut config = GenerationConfig::default();
        if let Some(model) = &self.default_model {
            config.model = model.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(top_p) = self.top_p {
            config.top_p = top_p;
        }
        if let Some(presence_penalty) = self.presence_penalty {
            config.presence_penalty = presence_penalty;
        }
        if let Some(frequency_penalty) = self.frequency_penalty {
            config.frequency_penalty = frequency_penalty;
        }

        ChatDefaults {
            system_message: self.default_system_message.clone().unwrap_or_default(),
            config,
            image_detail: self.default_image_detail.unwrap_or_default(),
        }
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget.unwrap_or(DEFAULT_TOKEN_BUDGET)
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }
}
