//! Configuration management for ollagate.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GateError, Result};

/// Top-level ollagate configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub telegram: TelegramSettings,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    /// Bot token from @BotFather. Usually supplied via TELEGRAM_BOT_TOKEN.
    #[serde(default)]
    pub bot_token: String,

    /// Long-poll timeout in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: u64,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            poll_timeout: default_poll_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Base URL of the local Ollama server.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound for one chat completion, in seconds.
    #[serde(default = "default_chat_timeout")]
    pub chat_timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_timeout_secs: default_chat_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Auto-end a session after this many seconds without activity.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Maximum history entries kept per user.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Reply chunk size, matched to the transport message ceiling.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Where the known-user registry lives. `None` = default data dir.
    pub registry_path: Option<PathBuf>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            history_window: default_history_window(),
            chunk_size: default_chunk_size(),
            registry_path: None,
        }
    }
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_chat_timeout() -> u64 {
    120
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_history_window() -> usize {
    20
}

fn default_chunk_size() -> usize {
    3800
}

impl GateConfig {
    /// Load config from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| GateError::Config(format!("Failed to read config: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| GateError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GateError::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ollagate")
            .join("config.toml")
    }

    /// Default registry file path, honoring the configured override.
    pub fn registry_path(&self) -> PathBuf {
        self.session.registry_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ollagate")
                .join("users.json")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let cfg = GateConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.session.idle_timeout_secs, 300);
        assert_eq!(cfg.session.history_window, 20);
        assert_eq!(cfg.session.chunk_size, 3800);
        assert_eq!(cfg.engine.base_url, "http://127.0.0.1:11434");
    }

    #[test]
    fn roundtrips_through_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = GateConfig::default();
        cfg.telegram.bot_token = "123:abc".to_string();
        cfg.session.idle_timeout_secs = 60;
        cfg.save(&path).unwrap();

        let loaded = GateConfig::load(&path).unwrap();
        assert_eq!(loaded.telegram.bot_token, "123:abc");
        assert_eq!(loaded.session.idle_timeout_secs, 60);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine]\nbase_url = \"http://10.0.0.5:11434\"\n").unwrap();
        let cfg = GateConfig::load(&path).unwrap();
        assert_eq!(cfg.engine.base_url, "http://10.0.0.5:11434");
        assert_eq!(cfg.engine.chat_timeout_secs, 120);
        assert_eq!(cfg.telegram.poll_timeout, 30);
    }
}
