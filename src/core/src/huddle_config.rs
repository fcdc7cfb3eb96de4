use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::paths::huddle_config_path;

pub const DEFAULT_MODEL: &str = "deepseek-v3.1:671b-cloud";

/// File-backed settings from `~/.huddle/config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HuddleConfig {
    pub backend: BackendConfig,
    pub chat: ChatConfig,
}

impl HuddleConfig {
    pub fn load() -> Result<Self, String> {
        let path = huddle_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw =
            std::fs::read_to_string(&path).map_err(|e| format!("read config.toml: {e}"))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| format!("parse config.toml: {e}"))
    }

    pub fn config_path() -> Result<PathBuf, String> {
        huddle_config_path()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the Ollama-compatible completion API.
    pub host: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
}

impl BackendConfig {
    /// Bearer token from the configured environment variable, if set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "https://ollama.com".to_string(),
            api_key_env: "OLLAMA_API_KEY".to_string(),
            request_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Model each new session starts with.
    pub default_model: String,
    /// Text of the `welcome` message sent to every new connection.
    pub welcome_message: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            welcome_message: "Connected to Huddle - Multi-Model Edition".to_string(),
        }
    }
}
