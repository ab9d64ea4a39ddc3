//! Thin wrapper over the compose CLI.
//!
//! Every invocation is scoped to one project (`-p`) and compose file (`-f`)
//! and runs through a [`CommandRunner`].

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SlipwayError};
use crate::runtime::{CommandOutput, CommandRunner, CommandSpec};

/// One row of `compose ps --format json`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ComposeContainer {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Service", default)]
    pub service: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Health", default)]
    pub health: String,
    #[serde(rename = "Publishers", default)]
    pub publishers: Option<Vec<Publisher>>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Publisher {
    #[serde(rename = "URL", default)]
    pub url: String,
    #[serde(rename = "TargetPort", default)]
    pub target_port: u16,
    #[serde(rename = "PublishedPort", default)]
    pub published_port: u16,
    #[serde(rename = "Protocol", default)]
    pub protocol: String,
}

impl ComposeContainer {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }

    /// Published host ports in listing order. IPv4 and IPv6 bindings of the
    /// same port appear twice in the listing; only the first is kept.
    pub fn published_ports(&self) -> Vec<u16> {
        dedup_in_order(
            self.publishers
                .iter()
                .flatten()
                .map(|p| p.published_port)
                .filter(|p| *p != 0),
        )
    }
}

fn dedup_in_order(ports: impl IntoIterator<Item = u16>) -> Vec<u16> {
    let mut out: Vec<u16> = Vec::new();
    for port in ports {
        if !out.contains(&port) {
            out.push(port);
        }
    }
    out
}

/// Compose CLI bound to one project.
pub struct ComposeCli {
    runner: Arc<dyn CommandRunner>,
    command: Vec<String>,
    docker_command: String,
    project: String,
    compose_file: PathBuf,
    workdir: PathBuf,
    timeout: Duration,
}

impl ComposeCli {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        command: Vec<String>,
        project: impl Into<String>,
        compose_file: impl Into<PathBuf>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            command,
            docker_command: "docker".to_string(),
            project: project.into(),
            compose_file: compose_file.into(),
            workdir: workdir.into(),
            timeout: Duration::from_secs(crate::runtime::DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Binary used for container-level calls such as `inspect`.
    pub fn with_docker_command(mut self, program: impl Into<String>) -> Self {
        self.docker_command = program.into();
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn spec<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Result<CommandSpec> {
        let base = CommandSpec::from_argv(&self.command).ok_or_else(|| {
            SlipwayError::Config("services.compose_command is empty".to_string())
        })?;
        let file = self.compose_file.to_string_lossy().to_string();
        Ok(base
            .args(["-f", file.as_str()])
            .args(["-p", self.project.as_str()])
            .args(args)
            .cwd(&self.workdir)
            .timeout(self.timeout))
    }

    async fn run(&self, spec: CommandSpec) -> Result<CommandOutput> {
        debug!(project = %self.project, command = %spec.display(), "compose");
        self.runner.run(&spec).await
    }

    /// `up -d <service>` with extra environment for the compose process.
    pub async fn up(&self, service: &str, env: &BTreeMap<String, String>) -> Result<CommandOutput> {
        let spec = self.spec(["up", "-d", service])?.envs(env.clone());
        self.run(spec).await
    }

    pub async fn stop(&self, service: &str) -> Result<CommandOutput> {
        self.run(self.spec(["stop", service])?).await
    }

    /// `down --remove-orphans`, optionally with `-v`.
    pub async fn down(&self, remove_volumes: bool) -> Result<CommandOutput> {
        let mut args = vec!["down"];
        if remove_volumes {
            args.push("-v");
        }
        args.push("--remove-orphans");
        self.run(self.spec(args)?).await
    }

    /// Containers for `service`, including stopped ones.
    pub async fn ps(&self, service: &str) -> Result<Vec<ComposeContainer>> {
        let out = self
            .run(self.spec(["ps", "--all", "--format", "json", service])?)
            .await?;
        if !out.success() {
            return Err(SlipwayError::Orchestrator(format!(
                "compose ps failed: {}",
                out.error_text()
            )));
        }
        parse_ps_output(&out.stdout)
    }

    /// Host ports bound by a container, via the lower-level inspect call.
    pub async fn inspect_ports(&self, container_id: &str) -> Result<Vec<u16>> {
        let spec = CommandSpec::new(self.docker_command.as_str())
            .args([
                "inspect",
                "--format",
                "{{json .NetworkSettings.Ports}}",
                container_id,
            ])
            .timeout(self.timeout);
        let out = self.run(spec).await?;
        if !out.success() {
            return Err(SlipwayError::Orchestrator(format!(
                "inspect {} failed: {}",
                container_id,
                out.error_text()
            )));
        }
        parse_inspect_ports(&out.stdout)
    }
}

/// Parse `ps --format json` output: a JSON array (older compose) or one
/// object per line (newer compose).
pub fn parse_ps_output(stdout: &str) -> Result<Vec<ComposeContainer>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str(l).map_err(SlipwayError::from))
        .collect()
}

#[derive(Deserialize)]
struct PortBinding {
    #[serde(rename = "HostPort", default)]
    host_port: String,
}

/// Parse `{{json .NetworkSettings.Ports}}` into host ports, ordered by
/// container port key.
pub fn parse_inspect_ports(stdout: &str) -> Result<Vec<u16>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let map: BTreeMap<String, Option<Vec<PortBinding>>> = serde_json::from_str(trimmed)?;
    Ok(dedup_in_order(
        map.into_values()
            .flatten()
            .flatten()
            .filter_map(|b| b.host_port.parse().ok())
            .filter(|p| *p != 0),
    ))
}
