//! Configuration management for Slipway
//!
//! Configuration is loaded from `~/.slipway/config.json` with environment
//! variable overrides of the form `SLIPWAY_SECTION_KEY`.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{Result, SlipwayError};
use std::path::{Path, PathBuf};

impl Config {
    /// Returns the Slipway configuration directory path (~/.slipway)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".slipway")
    }

    /// Returns the path to the config file (~/.slipway/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| {
                SlipwayError::Config(format!("{}: {}", path.display(), e))
            })?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        // Cache
        if let Ok(val) = std::env::var("SLIPWAY_CACHE_DIR") {
            self.cache.dir = Some(val);
        }
        if let Ok(val) = std::env::var("SLIPWAY_CACHE_FETCH_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.cache.fetch_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("SLIPWAY_CACHE_GIT_BASE_URL") {
            self.cache.git_base_url = val;
        }

        // Services
        if let Ok(val) = std::env::var("SLIPWAY_SERVICES_COMPOSE_COMMAND") {
            let parts: Vec<String> = val.split_whitespace().map(str::to_string).collect();
            if !parts.is_empty() {
                self.services.compose_command = parts;
            }
        }
        if let Ok(val) = std::env::var("SLIPWAY_SERVICES_DOCKER_COMMAND") {
            if !val.trim().is_empty() {
                self.services.docker_command = val.trim().to_string();
            }
        }
        if let Ok(val) = std::env::var("SLIPWAY_SERVICES_HEALTH_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.services.health_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("SLIPWAY_SERVICES_POLL_INTERVAL_MS") {
            if let Ok(v) = val.parse() {
                self.services.poll_interval_ms = v;
            }
        }
        if let Ok(val) = std::env::var("SLIPWAY_SERVICES_DELEGATE_DYNAMIC_PORTS") {
            if let Ok(v) = val.parse() {
                self.services.delegate_dynamic_ports = v;
            }
        }

        // Registry
        if let Ok(val) = std::env::var("SLIPWAY_REGISTRY_RESOLVE_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.registry.resolve_timeout_secs = v;
            }
        }

        // Logging
        if let Ok(val) = std::env::var("SLIPWAY_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("SLIPWAY_LOG_FORMAT") {
            if let Ok(format) = serde_json::from_value(serde_json::Value::String(val)) {
                self.logging.format = format;
            }
        }
    }

    /// Save configuration to a specific path (pretty JSON).
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir() {
        let dir = Config::dir();
        assert!(dir.to_string_lossy().contains(".slipway"));
        assert!(Config::path().ends_with(".slipway/config.json"));
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(&temp.path().join("missing.json")).unwrap();
        assert_eq!(config.services.project_prefix, "slipway");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.services.health_timeout_secs = 7;
        config.cache.git_base_url = "https://git.example.com".to_string();
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.services.health_timeout_secs, 7);
        assert_eq!(loaded.cache.git_base_url, "https://git.example.com");
    }

    #[test]
    fn test_load_invalid_json_is_config_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(matches!(err, SlipwayError::Config(_)));
    }
}
