//! Manifest loading and validation.
//!
//! Manifests are read from disk on every call so edits to a cached artifact
//! are picked up without re-fetching it.

mod types;

pub use types::{DockerSpec, EntryPoint, HealthCheckSpec, Manifest};

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::cache::CachedArtifact;
use crate::error::{Result, SlipwayError};

/// Manifest file name at the artifact root.
pub const MANIFEST_FILE: &str = "manifest.yaml";

/// Unquoted top-level `version:` value, as written.
static BARE_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^version:[ \t]*([0-9][0-9A-Za-z.+_-]*)[ \t]*(?:#.*)?\r?$")
        .expect("static regex")
});

/// Load and validate the manifest of a cached artifact.
pub async fn load(artifact: &CachedArtifact) -> Result<Manifest> {
    load_path(&artifact.manifest_path).await
}

/// Load and validate a manifest file.
pub async fn load_path(path: &Path) -> Result<Manifest> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        SlipwayError::InvalidManifest(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_manifest(&content)
}

/// Parse and validate manifest YAML.
pub fn parse_manifest(content: &str) -> Result<Manifest> {
    let mut manifest: Manifest = serde_yaml::from_str(content)
        .map_err(|e| SlipwayError::InvalidManifest(format!("malformed YAML: {}", e)))?;
    // YAML reads `1.10` as a float; keep the text the author wrote.
    if let Some(caps) = BARE_VERSION.captures(content) {
        manifest.version = caps[1].to_string();
    }
    validate(&manifest)?;
    Ok(manifest)
}

/// Check required fields.
pub fn validate(manifest: &Manifest) -> Result<()> {
    let mut missing = Vec::new();
    if manifest.name.trim().is_empty() {
        missing.push("name");
    }
    if manifest.version.trim().is_empty() {
        missing.push("version");
    }
    if let Some(ref docker) = manifest.docker {
        if docker.compose_file.trim().is_empty() {
            missing.push("docker.composeFile");
        }
        if docker.service_name.trim().is_empty() {
            missing.push("docker.serviceName");
        }
    }
    if let Some(ref entry) = manifest.entrypoint {
        if entry.command.trim().is_empty() {
            missing.push("entrypoint.command");
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SlipwayError::InvalidManifest(format!(
            "missing required field(s): {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE: &str = r#"
name: demo
version: 1.0.0
docker:
  composeFile: docker-compose.yml
  serviceName: demo
  ports: [0, 9000]
  healthCheck:
    endpoint: /health
  environment:
    MODEL: small
  startupTimeoutSecs: 90
"#;

    const PROVIDER: &str = r#"
name: tts-adapter
version: 2
id: acme-tts
type: text-to-audio
serviceUrl: github:acme/tts-service
capabilities: [text-to-audio]
entrypoint:
  command: node
  args: [index.js]
"#;

    #[test]
    fn test_parse_service_manifest() {
        let m = parse_manifest(SERVICE).unwrap();
        assert!(m.is_service());
        let docker = m.docker.unwrap();
        assert_eq!(docker.compose_file, "docker-compose.yml");
        assert_eq!(docker.ports, vec![0, 9000]);
        assert_eq!(
            docker.health_check.unwrap().endpoint.as_deref(),
            Some("/health")
        );
        assert_eq!(docker.environment.get("MODEL").map(String::as_str), Some("small"));
        assert_eq!(docker.startup_timeout_secs, Some(90));
    }

    #[test]
    fn test_parse_provider_manifest() {
        let m = parse_manifest(PROVIDER).unwrap();
        assert!(!m.is_service());
        assert_eq!(m.version, "2");
        assert_eq!(m.display_id(), "acme-tts");
        assert_eq!(m.kind.as_deref(), Some("text-to-audio"));
        assert_eq!(m.service_url.as_deref(), Some("github:acme/tts-service"));
        assert_eq!(m.entrypoint.unwrap().args, vec!["index.js"]);
    }

    #[test]
    fn test_scalar_environment_values_become_text() {
        let m = parse_manifest(
            "name: d\nversion: '1'\ndocker:\n  composeFile: c.yml\n  serviceName: d\n  environment:\n    PORT: 8080\n    DEBUG: true\n    RATIO: 0.5\n    NAME: small\n    EMPTY:\n",
        )
        .unwrap();
        let env = m.docker.unwrap().environment;
        assert_eq!(env["PORT"], "8080");
        assert_eq!(env["DEBUG"], "true");
        assert_eq!(env["RATIO"], "0.5");
        assert_eq!(env["NAME"], "small");
        assert_eq!(env["EMPTY"], "");

        let err = parse_manifest(
            "name: d\nversion: '1'\ndocker:\n  composeFile: c.yml\n  serviceName: d\n  environment:\n    LIST: [a, b]\n",
        )
        .unwrap_err();
        assert!(matches!(err, SlipwayError::InvalidManifest(_)));
    }

    #[test]
    fn test_bare_numeric_version_kept_as_written() {
        assert_eq!(parse_manifest("name: d\nversion: 1.10\n").unwrap().version, "1.10");
        assert_eq!(parse_manifest("name: d\nversion: 2 # major\n").unwrap().version, "2");
        assert_eq!(parse_manifest("name: d\nversion: '1.10'\n").unwrap().version, "1.10");
        assert_eq!(parse_manifest("name: d\nversion: 1.2.3\n").unwrap().version, "1.2.3");
    }

    #[test]
    fn test_absent_ports_is_empty_not_default() {
        let m = parse_manifest(
            "name: d\nversion: '1'\ndocker:\n  composeFile: c.yml\n  serviceName: d\n",
        )
        .unwrap();
        assert!(m.docker.unwrap().ports.is_empty());
    }

    #[test]
    fn test_missing_name_and_version() {
        let err = parse_manifest("capabilities: [x]\n").unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, SlipwayError::InvalidManifest(_)));
        assert!(msg.contains("name"));
        assert!(msg.contains("version"));
    }

    #[test]
    fn test_service_requires_compose_fields() {
        let err = parse_manifest("name: d\nversion: '1'\ndocker:\n  image: x\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("docker.composeFile"));
        assert!(msg.contains("docker.serviceName"));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = parse_manifest("name: [unclosed").unwrap_err();
        assert!(matches!(err, SlipwayError::InvalidManifest(_)));
    }

    #[test]
    fn test_display_id_falls_back_to_name() {
        let m = parse_manifest("name: plain\nversion: 0.1\n").unwrap();
        assert_eq!(m.display_id(), "plain");
        assert_eq!(m.version, "0.1");
    }

    #[tokio::test]
    async fn test_load_reads_fresh_each_time() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(MANIFEST_FILE);
        std::fs::write(&path, "name: a\nversion: '1'\n").unwrap();
        assert_eq!(load_path(&path).await.unwrap().name, "a");

        std::fs::write(&path, "name: b\nversion: '1'\n").unwrap();
        assert_eq!(load_path(&path).await.unwrap().name, "b");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        let err = load_path(&temp.path().join(MANIFEST_FILE)).await.unwrap_err();
        assert!(matches!(err, SlipwayError::InvalidManifest(_)));
    }
}
