//! Process-boundary provider plugins.
//!
//! An artifact whose manifest declares an `entrypoint` is driven as a
//! separate process speaking JSON-RPC 2.0 over stdin/stdout. Each `invoke`
//! spawns the entry point in the artifact directory, writes one request line
//! and reads the last non-empty stdout line as the response.
//!
//! Request:
//! ```json
//! {"jsonrpc":"2.0","id":1,"method":"synthesize","params":{"text":"hi"}}
//! ```
//!
//! Response:
//! ```json
//! {"jsonrpc":"2.0","id":1,"result":{"audio":"..."}}
//! ```
//!
//! When the manifest names a backing service it is started on demand and its
//! base URL passed to the plugin as `SLIPWAY_SERVICE_URL`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::types::{Provider, ProviderContext};
use crate::error::{Result, SlipwayError};
use crate::service::ServiceHandle;

/// Environment variable carrying the backing service URL.
pub const SERVICE_URL_ENV: &str = "SLIPWAY_SERVICE_URL";

const DEFAULT_PLUGIN_TIMEOUT_SECS: u64 = 120;

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Provider backed by an external executable.
pub struct PluginProvider {
    id: String,
    capabilities: Vec<String>,
    command: String,
    args: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
    service: Option<Arc<dyn ServiceHandle>>,
}

impl std::fmt::Debug for PluginProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginProvider")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("workdir", &self.workdir)
            .finish()
    }
}

impl PluginProvider {
    pub fn new(id: impl Into<String>, command: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            capabilities: Vec::new(),
            command: command.into(),
            args: Vec::new(),
            workdir: workdir.into(),
            timeout: Duration::from_secs(DEFAULT_PLUGIN_TIMEOUT_SECS),
            service: None,
        }
    }

    /// Build from a manifest `entrypoint`. `None` when it declares none.
    pub fn from_context(ctx: &ProviderContext) -> Option<Self> {
        let entry = ctx.manifest.entrypoint.as_ref()?;
        let mut plugin = Self::new(
            ctx.manifest.display_id(),
            entry.command.clone(),
            ctx.artifact.local_path.clone(),
        )
        .with_args(entry.args.clone())
        .with_capabilities(ctx.manifest.capabilities.clone());
        if let Some(secs) = entry.timeout_secs {
            plugin = plugin.with_timeout(Duration::from_secs(secs));
        }
        if let Some(ref service) = ctx.service {
            plugin = plugin.with_service(service.clone());
        }
        Some(plugin)
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_service(mut self, service: Arc<dyn ServiceHandle>) -> Self {
        self.service = Some(service);
        self
    }

    /// Start the backing service if needed and return its base URL.
    async fn service_url(&self) -> Result<Option<String>> {
        let Some(ref service) = self.service else {
            return Ok(None);
        };
        if !service.start().await {
            return Err(SlipwayError::Plugin(format!(
                "backing service '{}' for plugin '{}' is not healthy",
                service.name(),
                self.id
            )));
        }
        Ok(service.base_url().await)
    }

    fn resolve_command(&self) -> PathBuf {
        let candidate = self.workdir.join(&self.command);
        if self.command.contains('/') && candidate.exists() {
            candidate
        } else {
            PathBuf::from(&self.command)
        }
    }
}

#[async_trait]
impl Provider for PluginProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    async fn invoke(&self, method: &str, params: Value) -> Result<Value> {
        use tokio::io::AsyncWriteExt;
        use tokio::process::Command;

        let request = serde_json::to_string(&RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        })?;

        let mut cmd = Command::new(self.resolve_command());
        cmd.args(&self.args)
            .current_dir(&self.workdir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(url) = self.service_url().await? {
            cmd.env(SERVICE_URL_ENV, url);
        }

        let mut child = cmd.spawn().map_err(|e| {
            SlipwayError::Plugin(format!(
                "Failed to spawn plugin '{}' ({}): {}",
                self.id, self.command, e
            ))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(request.as_bytes()).await.map_err(|e| {
                SlipwayError::Plugin(format!("Failed to write to plugin '{}': {}", self.id, e))
            })?;
            stdin.write_all(b"\n").await.ok();
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                return Err(SlipwayError::Plugin(format!(
                    "Plugin '{}' process error: {}",
                    self.id, e
                )))
            }
            Err(_) => {
                return Err(SlipwayError::Plugin(format!(
                    "Plugin '{}' timed out after {}s",
                    self.id,
                    self.timeout.as_secs()
                )))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() { &stdout } else { &stderr };
            return Err(SlipwayError::Plugin(format!(
                "Plugin '{}' exited with code {}: {}",
                self.id,
                output.status.code().unwrap_or(-1),
                detail.trim()
            )));
        }

        let line = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| SlipwayError::Plugin(format!("Plugin '{}' produced no output", self.id)))?;

        let response: RpcResponse = serde_json::from_str(line).map_err(|e| {
            SlipwayError::Plugin(format!(
                "Plugin '{}' returned invalid JSON-RPC: {} (raw: {})",
                self.id,
                e,
                line.chars().take(200).collect::<String>()
            ))
        })?;

        if let Some(err) = response.error {
            warn!(plugin = %self.id, code = err.code, "Plugin returned error");
            return Err(SlipwayError::Plugin(format!(
                "Plugin '{}' error (code {}): {}",
                self.id, err.code, err.message
            )));
        }
        response.result.ok_or_else(|| {
            SlipwayError::Plugin(format!(
                "Plugin '{}' returned neither result nor error",
                self.id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn script(body: &str) -> (tempfile::TempDir, PluginProvider) {
        let temp = tempfile::tempdir().unwrap();
        let plugin = PluginProvider::new("test", "sh", temp.path())
            .with_args(vec!["-c".into(), body.into()])
            .with_capabilities(vec!["text-to-text".into()]);
        (temp, plugin)
    }

    #[tokio::test]
    async fn test_invoke_returns_result() {
        let (_t, plugin) = script(
            r#"read line; echo "log noise"; echo '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'"#,
        );
        let result = plugin.invoke("ping", json!({})).await.unwrap();
        assert_eq!(result, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_invoke_sees_request_on_stdin() {
        let (_t, plugin) = script(
            r#"read line; case "$line" in *'"method":"synthesize"'*) echo '{"jsonrpc":"2.0","id":1,"result":"matched"}';; *) echo '{"jsonrpc":"2.0","id":1,"result":"other"}';; esac"#,
        );
        let result = plugin.invoke("synthesize", json!({"text": "hi"})).await.unwrap();
        assert_eq!(result, json!("matched"));
    }

    #[tokio::test]
    async fn test_invoke_runs_in_artifact_dir() {
        let (temp, plugin) = script(
            r#"read line; printf '{"jsonrpc":"2.0","id":1,"result":"%s"}\n' "$(pwd)""#,
        );
        let result = plugin.invoke("pwd", json!(null)).await.unwrap();
        let dir = temp.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(result.as_str().unwrap().ends_with(&dir));
    }

    #[tokio::test]
    async fn test_invoke_rpc_error() {
        let (_t, plugin) = script(
            r#"read line; echo '{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"no such method"}}'"#,
        );
        let err = plugin.invoke("nope", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("no such method"));
    }

    #[tokio::test]
    async fn test_invoke_nonzero_exit() {
        let (_t, plugin) = script("read line; echo broken >&2; exit 2");
        let err = plugin.invoke("x", json!({})).await.unwrap_err();
        assert!(matches!(err, SlipwayError::Plugin(_)));
        assert!(err.to_string().contains("code 2"));
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_invoke_no_output() {
        let (_t, plugin) = script("read line");
        assert!(plugin.invoke("x", json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_invoke_timeout() {
        let (_t, plugin) = script("sleep 5");
        let plugin = plugin.with_timeout(Duration::from_millis(200));
        let err = plugin.invoke("x", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let temp = tempfile::tempdir().unwrap();
        let plugin = PluginProvider::new("missing", "slipway-no-such-binary", temp.path());
        assert!(plugin.invoke("x", json!({})).await.is_err());
    }

    #[test]
    fn test_from_context_without_entrypoint() {
        let ctx = ProviderContext {
            identifier: "npm:x".into(),
            manifest: crate::manifest::parse_manifest("name: x\nversion: '1'\n").unwrap(),
            artifact: crate::cache::CachedArtifact {
                identifier: "npm:x".into(),
                local_path: "/tmp".into(),
                manifest_path: "/tmp/manifest.yaml".into(),
                managed: true,
            },
            service: None,
        };
        assert!(PluginProvider::from_context(&ctx).is_none());
    }
}
