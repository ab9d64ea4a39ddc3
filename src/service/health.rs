//! Health polling.
//!
//! [`HealthMonitor`] drives a small state machine over repeated status
//! polls:
//!
//! ```text
//! Unknown -> Starting -> Healthy | Unhealthy
//!                     -> TimedOut (deadline reached)
//! ```
//!
//! `Unhealthy` is terminal and returned at once. A service that declares no
//! health check is healthy as soon as it reports running.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use super::types::{Health, ServiceStatus};
use crate::error::{Result, SlipwayError};

/// Default interval between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Unknown,
    Starting,
    Healthy,
    Unhealthy,
    TimedOut,
}

impl HealthState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            HealthState::Healthy | HealthState::Unhealthy | HealthState::TimedOut
        )
    }

    pub fn is_healthy(self) -> bool {
        self == HealthState::Healthy
    }
}

/// Something whose status can be polled.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn poll_status(&self) -> ServiceStatus;
}

/// Outcome of [`HealthMonitor::wait`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub polls: u32,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.state.is_healthy()
    }
}

#[derive(Debug, Clone)]
pub struct HealthMonitor {
    interval: Duration,
    has_health_check: bool,
}

impl HealthMonitor {
    pub fn new(interval: Duration, has_health_check: bool) -> Self {
        Self {
            interval,
            has_health_check,
        }
    }

    /// State implied by a single status sample.
    pub fn evaluate(&self, status: &ServiceStatus) -> HealthState {
        match status.health {
            Health::Healthy => HealthState::Healthy,
            Health::Unhealthy => HealthState::Unhealthy,
            _ if status.running && !self.has_health_check => HealthState::Healthy,
            _ => HealthState::Starting,
        }
    }

    /// Poll `source` until a terminal state or until `timeout` elapses.
    pub async fn wait<S>(&self, source: &S, timeout: Duration) -> HealthReport
    where
        S: StatusSource + ?Sized,
    {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut polls = 0;

        loop {
            let status = source.poll_status().await;
            polls += 1;
            let state = self.evaluate(&status);
            if state.is_terminal() {
                return HealthReport {
                    state,
                    polls,
                    elapsed: started.elapsed(),
                };
            }

            let now = Instant::now();
            if now >= deadline {
                return HealthReport {
                    state: HealthState::TimedOut,
                    polls,
                    elapsed: started.elapsed(),
                };
            }
            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, true)
    }
}

/// Checks an HTTP health endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `true` on a 2xx response.
    async fn check(&self, url: &str) -> bool;
}

/// Plain HTTP GET probe.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| SlipwayError::Orchestrator(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}
