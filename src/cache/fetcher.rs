//! Artifact fetcher trait and implementations.
//!
//! `ArtifactFetcher` abstracts the network/process work of populating a
//! directory. `RealFetcher` drives git, npm and tar through a
//! [`CommandRunner`]. `MockFetcher` is used in tests.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::{Result, SlipwayError};
use crate::identifier::{Descriptor, Scheme};
use crate::runtime::{CommandOutput, CommandRunner, CommandSpec};
use crate::utils::remove_dir_robust;

/// Populates a directory with an artifact's files.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch `descriptor` into `dest`, an existing empty directory.
    async fn fetch(&self, descriptor: &Descriptor, dest: &Path) -> Result<()>;
}

/// Fetches with the real git and npm tooling.
pub struct RealFetcher {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    git_base_url: String,
    git_command: String,
    npm_command: String,
}

impl RealFetcher {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &CacheConfig) -> Self {
        Self {
            runner,
            timeout: config.fetch_timeout(),
            git_base_url: config.git_base_url.trim_end_matches('/').to_string(),
            git_command: config.git_command.clone(),
            npm_command: config.npm_command.clone(),
        }
    }

    fn clone_url(&self, location: &str) -> String {
        format!("{}/{}.git", self.git_base_url, location)
    }

    async fn run(&self, spec: CommandSpec) -> Result<CommandOutput> {
        self.runner.run(&spec.timeout(self.timeout)).await
    }

    async fn fetch_git(&self, descriptor: &Descriptor, dest: &Path) -> Result<()> {
        let url = self.clone_url(&descriptor.location);
        let dest_arg = dest.to_string_lossy().to_string();

        let pinned = CommandSpec::new(&self.git_command).args([
            "clone",
            "--depth",
            "1",
            "--branch",
            descriptor.reference.as_str(),
            url.as_str(),
            dest_arg.as_str(),
        ]);
        let pinned_err = match self.run(pinned).await {
            Ok(out) if out.success() => return Ok(()),
            Ok(out) => out.error_text(),
            Err(e) => e.to_string(),
        };

        warn!(
            url = %url,
            reference = %descriptor.reference,
            error = %pinned_err,
            "Pinned clone failed, falling back to default branch"
        );

        // A failed clone may leave partial files behind.
        remove_dir_robust(dest).await?;
        std::fs::create_dir_all(dest)?;

        let unpinned = CommandSpec::new(&self.git_command).args([
            "clone",
            "--depth",
            "1",
            url.as_str(),
            dest_arg.as_str(),
        ]);
        let out = self
            .run(unpinned)
            .await
            .map_err(|e| SlipwayError::FetchFailed(format!("git clone {}: {}", url, e)))?;
        if out.success() {
            Ok(())
        } else {
            Err(SlipwayError::FetchFailed(format!(
                "git clone {} failed (ref '{}': {}; default branch: {})",
                url,
                descriptor.reference,
                pinned_err,
                out.error_text()
            )))
        }
    }

    async fn fetch_npm(&self, descriptor: &Descriptor, dest: &Path) -> Result<()> {
        let package = format!("{}@{}", descriptor.location, descriptor.reference);

        let out = self
            .run(
                CommandSpec::new(&self.npm_command)
                    .args(["pack", package.as_str(), "--silent"])
                    .cwd(dest),
            )
            .await
            .map_err(|e| SlipwayError::FetchFailed(format!("npm pack {}: {}", package, e)))?;
        if !out.success() {
            return Err(SlipwayError::FetchFailed(format!(
                "npm pack {} failed: {}",
                package,
                out.error_text()
            )));
        }

        let tarball = out
            .stdout
            .lines()
            .map(str::trim)
            .rfind(|l| l.ends_with(".tgz"))
            .ok_or_else(|| {
                SlipwayError::FetchFailed(format!("npm pack {} produced no tarball", package))
            })?
            .to_string();
        debug!(package = %package, tarball = %tarball, "Packed npm artifact");

        let out = self
            .run(
                CommandSpec::new("tar")
                    .args(["-xzf", tarball.as_str(), "--strip-components=1"])
                    .cwd(dest),
            )
            .await
            .map_err(|e| SlipwayError::FetchFailed(format!("extract {}: {}", tarball, e)))?;
        if !out.success() {
            return Err(SlipwayError::FetchFailed(format!(
                "extract {} failed: {}",
                tarball,
                out.error_text()
            )));
        }

        let _ = std::fs::remove_file(dest.join(&tarball));
        Ok(())
    }
}

#[async_trait]
impl ArtifactFetcher for RealFetcher {
    async fn fetch(&self, descriptor: &Descriptor, dest: &Path) -> Result<()> {
        match descriptor.scheme {
            Scheme::VersionControl => self.fetch_git(descriptor, dest).await,
            Scheme::PackageRegistry => self.fetch_npm(descriptor, dest).await,
            Scheme::LocalPath => Err(SlipwayError::FetchFailed(format!(
                "local path {} is used in place, not fetched",
                descriptor.location
            ))),
        }
    }
}

/// Mock fetcher for tests. Writes a manifest and counts calls.
#[cfg(test)]
pub struct MockFetcher {
    pub manifest: std::sync::Mutex<Option<String>>,
    pub failure: std::sync::Mutex<Option<String>>,
    pub delay: Duration,
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockFetcher {
    pub fn with_manifest(manifest: &str) -> Self {
        Self {
            manifest: std::sync::Mutex::new(Some(manifest.to_string())),
            failure: std::sync::Mutex::new(None),
            delay: Duration::ZERO,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Succeeds but writes no manifest.
    pub fn empty() -> Self {
        let fetcher = Self::with_manifest("");
        *fetcher.manifest.lock().unwrap() = None;
        fetcher
    }

    pub fn failure(msg: &str) -> Self {
        let fetcher = Self::empty();
        *fetcher.failure.lock().unwrap() = Some(msg.to_string());
        fetcher
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl ArtifactFetcher for MockFetcher {
    async fn fetch(&self, _descriptor: &Descriptor, dest: &Path) -> Result<()> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        std::fs::write(dest.join("README.md"), "fetched")?;
        if let Some(msg) = self.failure.lock().unwrap().clone() {
            return Err(SlipwayError::FetchFailed(msg));
        }
        if let Some(manifest) = self.manifest.lock().unwrap().clone() {
            std::fs::write(dest.join(crate::manifest::MANIFEST_FILE), manifest)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::parse;
    use crate::runtime::ScriptedRunner;

    fn fetcher(runner: Arc<ScriptedRunner>) -> RealFetcher {
        RealFetcher::new(runner, &CacheConfig::default())
    }

    #[tokio::test]
    async fn test_git_pinned_clone() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on(&["clone", "--branch"], CommandOutput::ok(""));

        let d = parse("github:acme/tts@v2").unwrap();
        fetcher(runner.clone()).fetch(&d, temp.path()).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].args.contains(&"v2".to_string()));
        assert!(calls[0]
            .args
            .contains(&"https://github.com/acme/tts.git".to_string()));
    }

    #[tokio::test]
    async fn test_git_falls_back_to_default_branch() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("dest");
        std::fs::create_dir_all(&dest).unwrap();

        let runner = Arc::new(ScriptedRunner::new());
        runner.on_with(&["clone", "--branch"], |spec| {
            // Leave debris behind like a half-finished clone.
            let dest = std::path::Path::new(spec.args.last().unwrap());
            std::fs::write(dest.join("partial"), "x").unwrap();
            CommandOutput::failed(128, "Remote branch nope not found")
        });
        runner.on(&["clone"], CommandOutput::ok(""));

        let d = parse("github:acme/tts@nope").unwrap();
        fetcher(runner.clone()).fetch(&d, &dest).await.unwrap();

        assert_eq!(runner.count(&["clone"]), 2);
        assert_eq!(runner.count(&["--branch"]), 1);
        assert!(!dest.join("partial").exists());
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn test_git_both_attempts_fail() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on(&["clone"], CommandOutput::failed(128, "repository not found"));

        let d = parse("github:acme/missing").unwrap();
        let err = fetcher(runner.clone())
            .fetch(&d, temp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, SlipwayError::FetchFailed(_)));
        assert!(err.to_string().contains("repository not found"));
        assert_eq!(runner.count(&["clone"]), 2);
    }

    #[tokio::test]
    async fn test_npm_pack_and_extract() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on(&["pack", "@acme/tts@1.0.0"], CommandOutput::ok("acme-tts-1.0.0.tgz\n"));
        runner.on(&["tar", "acme-tts-1.0.0.tgz"], CommandOutput::ok(""));

        let d = parse("@acme/tts@1.0.0").unwrap();
        fetcher(runner.clone()).fetch(&d, temp.path()).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].program, "tar");
        assert_eq!(calls[1].cwd.as_deref(), Some(temp.path()));
    }

    #[tokio::test]
    async fn test_npm_pack_failure() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on(&["pack"], CommandOutput::failed(1, "404 Not Found"));

        let d = parse("npm:ghost").unwrap();
        let err = fetcher(runner).fetch(&d, temp.path()).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_local_path_is_not_fetched() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let d = parse("file:///srv/demo").unwrap();
        assert!(fetcher(runner.clone()).fetch(&d, temp.path()).await.is_err());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_clone_url_custom_base() {
        let cfg = CacheConfig {
            git_base_url: "https://git.example.com/".to_string(),
            ..Default::default()
        };
        let f = RealFetcher::new(Arc::new(ScriptedRunner::new()), &cfg);
        assert_eq!(f.clone_url("a/b"), "https://git.example.com/a/b.git");
    }
}
