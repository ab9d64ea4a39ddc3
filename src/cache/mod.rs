//! On-disk artifact cache.
//!
//! One directory per artifact under a fixed root, named from the descriptor's
//! location so repeated requests reuse storage:
//!
//! ```text
//! <root>/git/<owner>-<repo>/manifest.yaml
//! <root>/npm/<scope>-<name>/manifest.yaml
//! ```
//!
//! A directory counts as valid only when its manifest exists. Fetches are
//! staged in a temporary sibling directory and renamed into place once the
//! manifest is confirmed, so a failed fetch never leaves a partial slot.

pub mod fetcher;

pub use fetcher::{ArtifactFetcher, RealFetcher};

#[cfg(test)]
pub use fetcher::MockFetcher;

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::{Result, SlipwayError};
use crate::identifier::{Descriptor, Scheme};
use crate::log_component;
use crate::manifest::MANIFEST_FILE;
use crate::runtime::CommandRunner;
use crate::utils::{remove_dir_robust, sanitize_component};

/// A locally available artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedArtifact {
    pub identifier: String,
    pub local_path: PathBuf,
    pub manifest_path: PathBuf,
    /// `true` when the directory was fetched into the cache (and may be
    /// deleted); `false` for user-provided local paths.
    pub managed: bool,
}

/// Fetches artifacts on demand and reuses existing copies.
pub struct ArtifactCache {
    root: PathBuf,
    manifest_file: String,
    fetcher: Arc<dyn ArtifactFetcher>,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self {
            root: root.into(),
            manifest_file: MANIFEST_FILE.to_string(),
            fetcher,
        }
    }

    /// Build a cache with a [`RealFetcher`] from configuration.
    pub fn from_config(config: &CacheConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let fetcher = Arc::new(RealFetcher::new(runner, config));
        Self::new(config.root(), fetcher).with_manifest_file(&config.manifest_file)
    }

    pub fn with_manifest_file(mut self, name: &str) -> Self {
        if !name.trim().is_empty() {
            self.manifest_file = name.to_string();
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic directory for a descriptor. Local paths map to themselves.
    pub fn dir_for(&self, descriptor: &Descriptor) -> PathBuf {
        match descriptor.scheme {
            Scheme::VersionControl => self
                .root
                .join("git")
                .join(sanitize_component(&descriptor.location)),
            Scheme::PackageRegistry => self
                .root
                .join("npm")
                .join(sanitize_component(&descriptor.location)),
            Scheme::LocalPath => PathBuf::from(&descriptor.location),
        }
    }

    fn manifest_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.manifest_file)
    }

    fn is_valid(&self, dir: &Path) -> bool {
        self.manifest_in(dir).is_file()
    }

    fn artifact(&self, identifier: &str, dir: PathBuf, managed: bool) -> CachedArtifact {
        CachedArtifact {
            identifier: identifier.to_string(),
            manifest_path: self.manifest_in(&dir),
            local_path: dir,
            managed,
        }
    }

    /// Ensure a local copy of `descriptor` exists and return it.
    ///
    /// A valid existing directory is returned without invoking the fetcher.
    pub async fn fetch(&self, identifier: &str, descriptor: &Descriptor) -> Result<CachedArtifact> {
        let dir = self.dir_for(descriptor);

        if descriptor.scheme == Scheme::LocalPath {
            if !self.is_valid(&dir) {
                return Err(SlipwayError::FetchFailed(format!(
                    "no {} in {}",
                    self.manifest_file,
                    dir.display()
                )));
            }
            return Ok(self.artifact(identifier, dir, false));
        }

        if self.is_valid(&dir) {
            log_component!(debug, "cache", "Reusing cached artifact", path = %dir.display());
            return Ok(self.artifact(identifier, dir, true));
        }

        if dir.exists() {
            warn!(path = %dir.display(), "Cached artifact has no manifest, re-fetching");
            remove_dir_robust(&dir).await.map_err(|e| {
                SlipwayError::FetchFailed(format!("cannot clear {}: {}", dir.display(), e))
            })?;
        }

        let parent = dir.parent().unwrap_or(&self.root).to_path_buf();
        std::fs::create_dir_all(&parent)?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&parent)
            .map_err(|e| {
                SlipwayError::FetchFailed(format!("cannot stage in {}: {}", parent.display(), e))
            })?;

        info!(identifier = %identifier, target = %dir.display(), "Fetching artifact");
        self.fetcher
            .fetch(descriptor, staging.path())
            .await
            .map_err(|e| match e {
                SlipwayError::FetchFailed(_) => e,
                other => SlipwayError::FetchFailed(other.to_string()),
            })?;

        if !self.is_valid(staging.path()) {
            return Err(SlipwayError::FetchFailed(format!(
                "{} has no {}",
                descriptor, self.manifest_file
            )));
        }

        // The staging guard is dropped afterwards; removing an already
        // renamed path is a no-op.
        if let Err(e) = std::fs::rename(staging.path(), &dir) {
            if self.is_valid(&dir) {
                debug!(path = %dir.display(), "Artifact appeared concurrently, reusing it");
            } else {
                return Err(SlipwayError::FetchFailed(format!(
                    "cannot move artifact into {}: {}",
                    dir.display(),
                    e
                )));
            }
        }

        Ok(self.artifact(identifier, dir, true))
    }

    /// Delete the cached copy of `descriptor`. Local paths are never touched.
    ///
    /// Returns whether anything was removed.
    pub async fn evict(&self, descriptor: &Descriptor) -> Result<bool> {
        if descriptor.scheme == Scheme::LocalPath {
            return Ok(false);
        }
        let dir = self.dir_for(descriptor);
        if !dir.exists() {
            return Ok(false);
        }
        remove_dir_robust(&dir).await?;
        log_component!(info, "cache", "Evicted artifact", path = %dir.display());
        Ok(true)
    }

    /// Remove an artifact directory if it is managed by this cache.
    pub async fn evict_artifact(&self, artifact: &CachedArtifact) -> Result<bool> {
        if !artifact.managed || !artifact.local_path.starts_with(&self.root) {
            return Ok(false);
        }
        remove_dir_robust(&artifact.local_path).await?;
        Ok(true)
    }

    /// Remove every cached artifact.
    pub async fn clear(&self) -> Result<()> {
        for kind in ["git", "npm"] {
            remove_dir_robust(&self.root.join(kind)).await?;
        }
        Ok(())
    }
}
