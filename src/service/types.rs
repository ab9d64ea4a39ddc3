//! Service status types and the host-facing service contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health reported for a backing process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Unhealthy,
    Starting,
    /// No health information (no check declared, or not running).
    #[default]
    None,
}

impl Health {
    /// Map a compose `Health` column value.
    pub fn from_compose(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "healthy" => Health::Healthy,
            "unhealthy" => Health::Unhealthy,
            "starting" => Health::Starting,
            _ => Health::None,
        }
    }
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Health::Healthy => "healthy",
            Health::Unhealthy => "unhealthy",
            Health::Starting => "starting",
            Health::None => "none",
        };
        write!(f, "{}", s)
    }
}

/// State string used when the container is absent from the listing.
pub const STATE_NOT_FOUND: &str = "not-found";
/// State string used when the orchestration CLI itself failed.
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Point-in-time status of a service. Always recomputed, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub running: bool,
    pub health: Health,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

impl ServiceStatus {
    pub fn not_found() -> Self {
        Self::stopped(STATE_NOT_FOUND)
    }

    pub fn unavailable() -> Self {
        Self::stopped(STATE_UNAVAILABLE)
    }

    fn stopped(state: &str) -> Self {
        Self {
            running: false,
            health: Health::None,
            state: state.to_string(),
            container_id: None,
        }
    }
}

/// Static description of a service for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub container_name: String,
    pub image: Option<String>,
    pub ports: Vec<u16>,
    pub health_check_url: String,
}

/// Lifecycle contract for a resolved service.
///
/// Lifecycle failures are reported as `false`, never as errors, so the host
/// can degrade gracefully.
#[async_trait]
pub trait ServiceHandle: Send + Sync {
    /// Manifest name of the service.
    fn name(&self) -> &str;

    /// Start if needed and wait until healthy.
    async fn start(&self) -> bool;

    /// Stop the backing process. Containers and volumes are kept.
    async fn stop(&self) -> bool;

    async fn restart(&self) -> bool;

    async fn status(&self) -> ServiceStatus;

    /// Poll until healthy, unhealthy, or `timeout` elapses.
    async fn wait_healthy(&self, timeout: Duration) -> bool;

    async fn info(&self) -> ServiceInfo;

    /// Remove containers and volumes, release ports, and delete a fetched
    /// artifact directory.
    async fn cleanup(&self) -> bool;

    /// Give back host ports claimed for this handle. The backing process is
    /// left alone. Calling it twice is harmless.
    fn release_ports(&self) {}

    /// Base URL of the running service (`http://localhost:<port>`).
    async fn base_url(&self) -> Option<String> {
        self.info()
            .await
            .ports
            .first()
            .map(|p| format!("http://localhost:{}", p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_from_compose() {
        assert_eq!(Health::from_compose("healthy"), Health::Healthy);
        assert_eq!(Health::from_compose("Unhealthy"), Health::Unhealthy);
        assert_eq!(Health::from_compose("starting"), Health::Starting);
        assert_eq!(Health::from_compose(""), Health::None);
    }

    #[test]
    fn test_not_found_status() {
        let s = ServiceStatus::not_found();
        assert!(!s.running);
        assert_eq!(s.state, "not-found");
        assert_eq!(s.health, Health::None);
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let s = ServiceStatus {
            running: true,
            health: Health::Healthy,
            state: "running".into(),
            container_id: Some("abc".into()),
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["containerId"], "abc");
        assert_eq!(json["health"], "healthy");
    }
}
