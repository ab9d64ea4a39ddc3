//! Configuration type definitions for Slipway
//!
//! All types implement serde traits for JSON serialization and have sensible
//! defaults, so a partial config file only needs the keys it changes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration struct for Slipway
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Artifact cache (fetch commands, timeouts, layout)
    pub cache: CacheConfig,
    /// Container-backed service orchestration
    pub services: ServicesConfig,
    /// Instance registry behaviour
    pub registry: RegistryConfig,
    /// Log output
    pub logging: LoggingConfig,
}

// ============================================================================
// Cache Configuration
// ============================================================================

/// Artifact cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root. `None` means `~/.slipway/cache`.
    pub dir: Option<String>,
    /// Upper bound for each fetch attempt (clone, pack, extract).
    pub fetch_timeout_secs: u64,
    /// Base URL that version-control locations are cloned from.
    pub git_base_url: String,
    /// Git binary.
    pub git_command: String,
    /// npm binary.
    pub npm_command: String,
    /// Manifest file name at the artifact root.
    pub manifest_file: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            fetch_timeout_secs: 120,
            git_base_url: "https://github.com".to_string(),
            git_command: "git".to_string(),
            npm_command: "npm".to_string(),
            manifest_file: crate::manifest::MANIFEST_FILE.to_string(),
        }
    }
}

impl CacheConfig {
    /// Resolved cache root (expands a leading `~/`).
    pub fn root(&self) -> PathBuf {
        match self.dir.as_deref() {
            Some(dir) if !dir.trim().is_empty() => expand_home(dir),
            _ => super::Config::dir().join("cache"),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

// ============================================================================
// Services Configuration
// ============================================================================

/// Service orchestration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Compose invocation, program first (e.g. `["docker", "compose"]`).
    pub compose_command: Vec<String>,
    /// Container CLI for calls compose does not cover, such as `inspect`.
    pub docker_command: String,
    /// Upper bound for a single compose command.
    pub command_timeout_secs: u64,
    /// Default wait for a service to report healthy after `up`.
    pub health_timeout_secs: u64,
    /// Interval between health polls.
    pub poll_interval_ms: u64,
    /// Compose project name prefix.
    pub project_prefix: String,
    /// Interface used when probing for free ephemeral ports.
    pub bind_host: String,
    /// Publish `0` for dynamic ports and let the container runtime choose.
    pub delegate_dynamic_ports: bool,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            compose_command: vec!["docker".to_string(), "compose".to_string()],
            docker_command: "docker".to_string(),
            command_timeout_secs: 120,
            health_timeout_secs: 60,
            poll_interval_ms: 1000,
            project_prefix: "slipway".to_string(),
            bind_host: "127.0.0.1".to_string(),
            delegate_dynamic_ports: false,
        }
    }
}

// ============================================================================
// Registry Configuration
// ============================================================================

/// Default bound on one resolution, in seconds.
pub const DEFAULT_RESOLVE_TIMEOUT_SECS: u64 = 300;

/// Registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Bounds a full resolution and how long concurrent callers wait for it.
    pub resolve_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            resolve_timeout_secs: DEFAULT_RESOLVE_TIMEOUT_SECS,
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, coloured
    Pretty,
    /// Compact single line with a `component` field
    #[default]
    Component,
    /// JSON lines
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// Append logs to this file instead of stderr.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Component,
            file: None,
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.fetch_timeout_secs, 120);
        assert_eq!(config.cache.manifest_file, "manifest.yaml");
        assert_eq!(config.services.compose_command, vec!["docker", "compose"]);
        assert_eq!(config.services.docker_command, "docker");
        assert_eq!(config.services.poll_interval_ms, 1000);
        assert_eq!(config.registry.resolve_timeout_secs, 300);
        assert_eq!(config.logging.format, LogFormat::Component);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"services":{"health_timeout_secs":5}}"#).unwrap();
        assert_eq!(config.services.health_timeout_secs, 5);
        assert_eq!(config.services.project_prefix, "slipway");
        assert_eq!(config.cache.git_command, "git");
    }

    #[test]
    fn test_cache_root_default_under_config_dir() {
        let root = CacheConfig::default().root();
        assert!(root.ends_with(".slipway/cache"));
    }

    #[test]
    fn test_cache_root_explicit() {
        let cfg = CacheConfig {
            dir: Some("/var/cache/slipway".to_string()),
            ..Default::default()
        };
        assert_eq!(cfg.root(), PathBuf::from("/var/cache/slipway"));
    }

    #[test]
    fn test_log_format_deserialize() {
        let cfg: LoggingConfig =
            serde_json::from_str(r#"{"format":"json","level":"debug"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, "debug");
        assert!(cfg.file.is_none());
    }
}
