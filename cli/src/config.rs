//! Agent configuration stored in `~/.couchpad/config.json`

use crate::platform;
use couchpad_protocol::Role;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_RELAY_URL: &str = "http://localhost:8080";

/// Overrides `relay_url` from the config file
pub const RELAY_URL_ENV: &str = "COUCHPAD_RELAY_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config: {0}")]
    Io(#[from] io::Error),
    #[error("Config file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which input backend the agent should try first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Best available, in rank order
    #[default]
    Auto,
    Native,
    Helper,
    Script,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub relay_url: String,
    /// Room code used by the last `pair`, `agent` or `remote` run
    pub last_room: Option<String>,
    pub last_role: Option<Role>,
    /// Invert scroll deltas
    pub natural_scroll: bool,
    /// Multiplier for trackpad motion deltas
    pub pointer_sensitivity: f64,
    /// Used when the backend cannot report the screen size
    pub screen: Option<ScreenSize>,
    pub backend: BackendPreference,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            last_room: None,
            last_role: None,
            natural_scroll: false,
            pointer_sensitivity: 1.0,
            screen: None,
            backend: BackendPreference::Auto,
        }
    }
}

/// Get the config file path (cross-platform)
pub fn config_path() -> PathBuf {
    platform::config_dir().join("config.json")
}

impl AgentConfig {
    /// Load the saved config, falling back to defaults when none exists,
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&config_path())?;
        if let Ok(url) = std::env::var(RELAY_URL_ENV) {
            if !url.trim().is_empty() {
                config.relay_url = url.trim().to_string();
            }
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Remember the room so `agent`/`remote` can rejoin without a code
    pub fn remember_room(&mut self, code: &str, role: Role) {
        self.last_room = Some(code.to_string());
        self.last_role = Some(role);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("couchpad-test-{}-{}", std::process::id(), name))
            .join("config.json")
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = AgentConfig::load_from(&temp_path("missing")).unwrap();
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.relay_url, DEFAULT_RELAY_URL);
    }

    #[test]
    fn test_save_and_reload() {
        let path = temp_path("roundtrip");
        let mut config = AgentConfig {
            natural_scroll: true,
            backend: BackendPreference::Helper,
            screen: Some(ScreenSize {
                width: 2560,
                height: 1440,
            }),
            ..AgentConfig::default()
        };
        config.remember_room("HOMETV", Role::Display);
        config.save_to(&path).unwrap();

        let loaded = AgentConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = temp_path("partial");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"relay_url":"https://relay.example.com","natural_scroll":true}"#)
            .unwrap();

        let loaded = AgentConfig::load_from(&path).unwrap();
        assert_eq!(loaded.relay_url, "https://relay.example.com");
        assert!(loaded.natural_scroll);
        assert_eq!(loaded.pointer_sensitivity, 1.0);
        assert_eq!(loaded.backend, BackendPreference::Auto);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let path = temp_path("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            AgentConfig::load_from(&path),
            Err(ConfigError::Json(_))
        ));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
