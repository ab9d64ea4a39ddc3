//! Host process runner.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::types::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::{Result, SlipwayError};

/// Runs commands directly on the host with `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = spec.cwd {
            cmd.current_dir(dir);
        }

        debug!(command = %spec.display(), "Running command");

        let output = tokio::time::timeout(spec.timeout, cmd.output())
            .await
            .map_err(|_| {
                SlipwayError::Timeout(format!(
                    "'{}' did not finish within {}s",
                    spec.display(),
                    spec.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                SlipwayError::Orchestrator(format!("failed to run '{}': {}", spec.program, e))
            })?;

        Ok(CommandOutput::new(
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
            output.status.code(),
        ))
    }
}
