//! CLI smoke tests: run the compiled binary and check exit codes and output.
//!
//! Every run gets its own HOME and cache directory. No network, Docker or npm
//! required.

use std::path::Path;
use std::process::Command;

/// Helper: run slipway with given args and return (exit_code, stdout, stderr).
fn run_cli_in(home: &Path, args: &[&str]) -> (i32, String, String) {
    let bin = env!("CARGO_BIN_EXE_slipway");
    let output = Command::new(bin)
        .args(args)
        .env("HOME", home)
        .env("SLIPWAY_CACHE_DIR", home.join("cache"))
        .env("RUST_LOG", "error") // suppress tracing noise
        .output()
        .expect("failed to execute slipway binary");
    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

fn run_cli(args: &[&str]) -> (i32, String, String) {
    let home = tempfile::tempdir().unwrap();
    run_cli_in(home.path(), args)
}

// ============================================================================
// Help & Version
// ============================================================================

#[test]
fn cli_no_args_shows_help() {
    let (code, stdout, _stderr) = run_cli(&[]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("slipway"));
}

#[test]
fn cli_help_flag() {
    let (code, stdout, _stderr) = run_cli(&["--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Commands:"));
    assert!(stdout.contains("resolve"));
    assert!(stdout.contains("service"));
}

#[test]
fn cli_version_command() {
    let (code, stdout, _stderr) = run_cli(&["version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("slipway"));
    assert!(stdout.contains('.'));
}

// ============================================================================
// Parse
// ============================================================================

#[test]
fn cli_parse_scoped_package() {
    let (code, stdout, _stderr) = run_cli(&["parse", "npm:@acme/tts@1.2.0"]);
    assert_eq!(code, 0);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["scheme"], "package_registry");
    assert_eq!(value["location"], "@acme/tts");
    assert_eq!(value["reference"], "1.2.0");
}

#[test]
fn cli_parse_github_ref() {
    let (code, stdout, _stderr) = run_cli(&["parse", "github:acme/tts#v2"]);
    assert_eq!(code, 0);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["scheme"], "version_control");
    assert_eq!(value["location"], "acme/tts");
    assert_eq!(value["reference"], "v2");
}

#[test]
fn cli_parse_rejects_unknown_scheme() {
    let (code, _stdout, stderr) = run_cli(&["parse", "openai"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("openai"), "stderr: {}", stderr);
}

// ============================================================================
// Resolve
// ============================================================================

#[test]
fn cli_resolve_unknown_identifier() {
    let (code, _stdout, stderr) = run_cli(&["resolve", "no-such-provider"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("No provider or service found"), "stderr: {}", stderr);
}

#[test]
fn cli_resolve_local_service() {
    let home = tempfile::tempdir().unwrap();
    let artifact = home.path().join("demo");
    std::fs::create_dir_all(&artifact).unwrap();
    std::fs::write(
        artifact.join("manifest.yaml"),
        "name: demo\nversion: '1'\ndocker:\n  composeFile: docker-compose.yml\n  serviceName: demo\n  ports: [8123]\n",
    )
    .unwrap();

    let id = format!("file:{}", artifact.display());
    let (code, stdout, stderr) = run_cli_in(home.path(), &["resolve", &id]);
    assert_eq!(code, 0, "stderr: {}", stderr);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["kind"], "service");
    assert_eq!(value["name"], "demo");
    assert_eq!(value["info"]["ports"][0], 8123);
    assert_eq!(value["info"]["healthCheckUrl"], "http://localhost:8123/health");
}

#[test]
fn cli_resolve_local_path_without_manifest() {
    let home = tempfile::tempdir().unwrap();
    let id = format!("file:{}", home.path().display());
    let (code, _stdout, stderr) = run_cli_in(home.path(), &["resolve", &id]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Fetch failed"), "stderr: {}", stderr);
}

#[test]
fn cli_refresh_uncached_identifier() {
    let (code, stdout, _stderr) = run_cli(&["refresh", "npm:never-fetched"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Refreshed"));
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn cli_cache_path_honours_env() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _stderr) = run_cli_in(home.path(), &["cache", "path"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), home.path().join("cache").display().to_string());
}

#[test]
fn cli_cache_clear() {
    let home = tempfile::tempdir().unwrap();
    let stale = home.path().join("cache").join("npm").join("old");
    std::fs::create_dir_all(&stale).unwrap();

    let (code, stdout, _stderr) = run_cli_in(home.path(), &["cache", "clear"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Cleared"));
    assert!(!stale.exists());
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn cli_config_show() {
    let (code, stdout, _stderr) = run_cli(&["config", "show"]);
    assert_eq!(code, 0);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["registry"]["resolve_timeout_secs"], 300);
    assert_eq!(value["services"]["compose_command"][0], "docker");
}

#[test]
fn cli_config_check_without_file() {
    let (code, stdout, _stderr) = run_cli(&["config", "check"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("No config file found"));
}

#[test]
fn cli_config_check_reports_typo() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("config.json");
    std::fs::write(&path, r#"{"cahce": {}}"#).unwrap();

    let (code, stdout, _stderr) = run_cli_in(
        home.path(),
        &["--config", path.to_str().unwrap(), "config", "check"],
    );
    assert_eq!(code, 1);
    assert!(stdout.contains("[ERROR]"));
    assert!(stdout.contains("cache"), "expected a suggestion: {}", stdout);
}

#[test]
fn cli_service_help() {
    let (code, stdout, _stderr) = run_cli(&["service", "--help"]);
    assert_eq!(code, 0);
    for action in ["start", "stop", "restart", "status", "info", "cleanup"] {
        assert!(stdout.contains(action), "missing {}", action);
    }
}
