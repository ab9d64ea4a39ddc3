//! Compose-backed service lifecycle.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::compose::ComposeCli;
use super::health::{HealthMonitor, HealthProbe, StatusSource};
use super::ports::{PortAllocator, PortAssignment};
use super::types::{Health, ServiceHandle, ServiceInfo, ServiceStatus};
use crate::cache::{ArtifactCache, CachedArtifact};
use crate::config::ServicesConfig;
use crate::error::{Result, SlipwayError};
use crate::log_component;
use crate::manifest::{DockerSpec, Manifest};
use crate::runtime::CommandRunner;
use crate::utils::sanitize_component;

const DEFAULT_HEALTH_ENDPOINT: &str = "/health";

/// Knobs for a [`ServiceOrchestrator`], usually taken from [`ServicesConfig`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub compose_command: Vec<String>,
    /// Binary for container-level calls (`inspect`).
    pub docker_command: String,
    pub command_timeout: Duration,
    pub health_timeout: Duration,
    pub poll_interval: Duration,
    pub project_prefix: String,
    /// Publish dynamic ports as `0` and learn them after start.
    pub delegate_dynamic_ports: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&ServicesConfig::default())
    }
}

impl From<&ServicesConfig> for OrchestratorSettings {
    fn from(cfg: &ServicesConfig) -> Self {
        Self {
            compose_command: cfg.compose_command.clone(),
            docker_command: cfg.docker_command.clone(),
            command_timeout: Duration::from_secs(cfg.command_timeout_secs),
            health_timeout: Duration::from_secs(cfg.health_timeout_secs),
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            project_prefix: cfg.project_prefix.clone(),
            delegate_dynamic_ports: cfg.delegate_dynamic_ports,
        }
    }
}

/// `<SERVICE_NAME_UPPER>_HOST_PORT`
pub fn port_env_var(service_name: &str) -> String {
    let upper: String = service_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_HOST_PORT", upper)
}

/// Manages one declared compose service: start, stop, health, ports.
pub struct ServiceOrchestrator {
    manifest: Manifest,
    docker: DockerSpec,
    artifact: CachedArtifact,
    compose: ComposeCli,
    allocator: PortAllocator,
    probe: Arc<dyn HealthProbe>,
    cache: Option<Arc<ArtifactCache>>,
    settings: OrchestratorSettings,
    container_name: String,
    ports: RwLock<PortAssignment>,
    /// Ports this orchestrator holds in the shared ledger.
    claimed: Mutex<Vec<u16>>,
}

impl ServiceOrchestrator {
    /// Build an orchestrator. Ports are assigned here, once.
    pub fn new(
        manifest: Manifest,
        artifact: CachedArtifact,
        allocator: PortAllocator,
        runner: Arc<dyn CommandRunner>,
        probe: Arc<dyn HealthProbe>,
        settings: OrchestratorSettings,
    ) -> Result<Self> {
        let docker = manifest.docker.clone().ok_or_else(|| {
            SlipwayError::InvalidManifest(format!("'{}' declares no docker service", manifest.name))
        })?;

        let declared = docker.ports.clone();
        let (assigned, claimed) = if settings.delegate_dynamic_ports {
            let fixed: Vec<u16> = declared.iter().copied().filter(|p| *p != 0).collect();
            (fixed, Vec::new())
        } else {
            let assigned = allocator.assign(&declared)?;
            (assigned.clone(), assigned)
        };

        let project = format!(
            "{}-{}",
            settings.project_prefix,
            sanitize_component(&manifest.name).to_ascii_lowercase()
        );
        let container_name = docker
            .container_name
            .clone()
            .unwrap_or_else(|| format!("{}-{}-1", project, docker.service_name));
        let compose = ComposeCli::new(
            runner,
            settings.compose_command.clone(),
            project,
            docker.compose_file.clone(),
            artifact.local_path.clone(),
        )
        .with_timeout(settings.command_timeout)
        .with_docker_command(settings.docker_command.clone());

        log_component!(
            debug,
            "service",
            "Orchestrator ready",
            service = %docker.service_name,
            ports = ?assigned
        );

        Ok(Self {
            ports: RwLock::new(PortAssignment::new(declared, assigned)),
            claimed: Mutex::new(claimed),
            manifest,
            docker,
            artifact,
            compose,
            allocator,
            probe,
            cache: None,
            settings,
            container_name,
        })
    }

    /// Cache used by `cleanup()` to delete a fetched artifact.
    pub fn with_cache(mut self, cache: Arc<ArtifactCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn artifact(&self) -> &CachedArtifact {
        &self.artifact
    }

    pub fn project(&self) -> &str {
        self.compose.project()
    }

    pub fn port_assignment(&self) -> PortAssignment {
        self.ports.read().unwrap().clone()
    }

    fn service_name(&self) -> &str {
        &self.docker.service_name
    }

    fn has_health_check(&self) -> bool {
        self.docker
            .health_check
            .as_ref()
            .is_some_and(|hc| hc.url.is_some() || hc.endpoint.is_some())
    }

    fn startup_timeout(&self) -> Duration {
        self.docker
            .startup_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.settings.health_timeout)
    }

    /// Environment handed to the compose process on `up`.
    pub fn port_environment(&self) -> BTreeMap<String, String> {
        let mut env = self.docker.environment.clone();
        let ports = if self.settings.delegate_dynamic_ports {
            let declared = &self.ports.read().unwrap().declared;
            if declared.is_empty() {
                vec![0]
            } else {
                declared.clone()
            }
        } else {
            self.ports.read().unwrap().assigned.clone()
        };

        let var = port_env_var(self.service_name());
        for (idx, port) in ports.iter().enumerate() {
            let key = if idx == 0 {
                var.clone()
            } else {
                format!("{}_{}", var, idx + 1)
            };
            env.insert(key, port.to_string());
        }
        env
    }

    /// Health URL for the current primary port.
    pub fn health_check_url(&self) -> String {
        let port = self.ports.read().unwrap().primary().unwrap_or(0);
        let hc = self.docker.health_check.as_ref();

        if let Some(url) = hc.and_then(|h| h.url.as_deref()) {
            return url
                .replace("{port}", &port.to_string())
                .replace("${PORT}", &port.to_string());
        }
        let endpoint = hc
            .and_then(|h| h.endpoint.as_deref())
            .unwrap_or(DEFAULT_HEALTH_ENDPOINT);
        let sep = if endpoint.starts_with('/') { "" } else { "/" };
        format!("http://localhost:{}{}{}", port, sep, endpoint)
    }

    /// Health URL, or `None` while the URL needs a port that is not known yet.
    fn health_target(&self) -> Option<String> {
        let port_known = self.ports.read().unwrap().primary().is_some();
        let fixed_url = self
            .docker
            .health_check
            .as_ref()
            .and_then(|h| h.url.as_deref())
            .is_some_and(|u| !u.contains("{port}") && !u.contains("${PORT}"));
        (port_known || fixed_url).then(|| self.health_check_url())
    }

    async fn refresh_ports(&self) {
        match self.allocator.detect(&self.compose, self.service_name()).await {
            Ok(detected) => {
                debug!(service = %self.service_name(), ports = ?detected, "Detected ports");
                self.ports.write().unwrap().set_detected(detected);
            }
            Err(e) => warn!(service = %self.service_name(), error = %e, "Port detection failed"),
        }
    }

    async fn compute_status(&self) -> ServiceStatus {
        let rows = match self.compose.ps(self.service_name()).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(service = %self.service_name(), error = %e, "Status query failed");
                return ServiceStatus::unavailable();
            }
        };

        let Some(row) = rows.iter().find(|c| c.service == self.service_name()) else {
            return ServiceStatus::not_found();
        };

        let mut status = ServiceStatus {
            running: row.is_running(),
            health: Health::from_compose(&row.health),
            state: row.state.to_ascii_lowercase(),
            container_id: (!row.id.is_empty()).then(|| row.id.clone()),
        };

        if status.running {
            let published = row.published_ports();
            if !published.is_empty() {
                self.ports.write().unwrap().set_detected(published);
            }
        }

        if status.running && status.health == Health::None && self.has_health_check() {
            status.health = match self.health_target() {
                Some(url) => {
                    if self.probe.check(&url).await {
                        Health::Healthy
                    } else {
                        Health::Starting
                    }
                }
                None => {
                    debug!(service = %self.service_name(), "Host port not published yet");
                    Health::Starting
                }
            };
        }
        status
    }
}

#[async_trait]
impl StatusSource for ServiceOrchestrator {
    async fn poll_status(&self) -> ServiceStatus {
        self.compute_status().await
    }
}

#[async_trait]
impl ServiceHandle for ServiceOrchestrator {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    async fn start(&self) -> bool {
        let monitor = HealthMonitor::new(self.settings.poll_interval, self.has_health_check());
        let current = self.compute_status().await;
        if current.running && monitor.evaluate(&current).is_healthy() {
            debug!(service = %self.service_name(), "Already running and healthy");
            self.refresh_ports().await;
            return true;
        }

        info!(service = %self.service_name(), project = %self.project(), "Starting service");
        match self
            .compose
            .up(self.service_name(), &self.port_environment())
            .await
        {
            Ok(out) if out.success() => {}
            Ok(out) => {
                error!(service = %self.service_name(), error = %out.error_text(), "compose up failed");
                return false;
            }
            Err(e) => {
                error!(service = %self.service_name(), error = %e, "compose up failed");
                return false;
            }
        }

        let healthy = self.wait_healthy(self.startup_timeout()).await;
        if healthy {
            self.refresh_ports().await;
            info!(service = %self.service_name(), url = %self.health_check_url(), "Service healthy");
        }
        healthy
    }

    async fn stop(&self) -> bool {
        let ok = match self.compose.stop(self.service_name()).await {
            Ok(out) if out.success() => true,
            Ok(out) => {
                error!(service = %self.service_name(), error = %out.error_text(), "compose stop failed");
                false
            }
            Err(e) => {
                error!(service = %self.service_name(), error = %e, "compose stop failed");
                false
            }
        };
        self.refresh_ports().await;
        if ok {
            info!(service = %self.service_name(), "Service stopped");
        }
        ok
    }

    async fn restart(&self) -> bool {
        if !self.stop().await {
            warn!(service = %self.service_name(), "Stop failed during restart, starting anyway");
        }
        self.start().await
    }

    async fn status(&self) -> ServiceStatus {
        self.compute_status().await
    }

    async fn wait_healthy(&self, timeout: Duration) -> bool {
        let monitor = HealthMonitor::new(self.settings.poll_interval, self.has_health_check());
        let report = monitor.wait(self, timeout).await;
        log_component!(
            debug,
            "health",
            "Health wait finished",
            service = %self.service_name(),
            state = ?report.state,
            polls = report.polls
        );
        if !report.healthy() {
            warn!(service = %self.service_name(), state = ?report.state, "Service not healthy");
        }
        report.healthy()
    }

    async fn info(&self) -> ServiceInfo {
        ServiceInfo {
            container_name: self.container_name.clone(),
            image: self.docker.image.clone(),
            ports: self.ports.read().unwrap().effective(),
            health_check_url: self.health_check_url(),
        }
    }

    async fn cleanup(&self) -> bool {
        let down_ok = match self.compose.down(true).await {
            Ok(out) if out.success() => true,
            Ok(out) => {
                error!(project = %self.project(), error = %out.error_text(), "compose down failed");
                false
            }
            Err(e) => {
                error!(project = %self.project(), error = %e, "compose down failed");
                false
            }
        };

        self.release_ports();
        self.ports.write().unwrap().detected.clear();

        let mut evict_ok = true;
        if let Some(ref cache) = self.cache {
            if let Err(e) = cache.evict_artifact(&self.artifact).await {
                error!(path = %self.artifact.local_path.display(), error = %e, "Artifact removal failed");
                evict_ok = false;
            }
        }
        down_ok && evict_ok
    }

    fn release_ports(&self) {
        let held = std::mem::take(&mut *self.claimed.lock().unwrap());
        if !held.is_empty() {
            debug!(service = %self.service_name(), ports = ?held, "Releasing ports");
            self.allocator.ledger().release_all(&held);
        }
    }
}
