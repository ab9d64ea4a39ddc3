//! Filesystem helpers for the artifact cache.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

const REMOVE_ATTEMPTS: u32 = 3;
const REMOVE_BACKOFF_MS: u64 = 100;

/// Remove a directory tree, tolerating transient lock and permission errors.
///
/// A missing directory counts as removed. Each failed attempt clears read-only
/// bits (git pack files are read-only) and backs off before retrying. If the
/// tree still cannot be deleted, it is renamed aside so the original path is
/// free for a fresh fetch; the renamed copy is removed best-effort.
pub async fn remove_dir_robust(path: &Path) -> std::io::Result<()> {
    let mut last_err = None;

    for attempt in 1..=REMOVE_ATTEMPTS {
        match std::fs::remove_dir_all(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    attempt,
                    error = %e,
                    "Failed to remove directory, retrying"
                );
                clear_readonly(path);
                last_err = Some(e);
                tokio::time::sleep(Duration::from_millis(REMOVE_BACKOFF_MS * attempt as u64))
                    .await;
            }
        }
    }

    let aside = stale_path(path);
    match std::fs::rename(path, &aside) {
        Ok(()) => {
            debug!(from = %path.display(), to = %aside.display(), "Moved stubborn directory aside");
            if let Err(e) = std::fs::remove_dir_all(&aside) {
                warn!(path = %aside.display(), error = %e, "Leaving stale directory behind");
            }
            Ok(())
        }
        Err(_) => Err(last_err
            .unwrap_or_else(|| std::io::Error::other(format!("cannot remove {}", path.display())))),
    }
}

/// Recursively clear the read-only attribute below `path`. Best-effort.
fn clear_readonly(path: &Path) {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return;
    };
    if meta.file_type().is_symlink() {
        return;
    }
    let mut perms = meta.permissions();
    if perms.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        let _ = std::fs::set_permissions(path, perms);
    }
    if meta.is_dir() {
        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                clear_readonly(&entry.path());
            }
        }
    }
}

fn stale_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    path.with_file_name(format!(".{}.stale-{}-{}", name, std::process::id(), stamp))
}

/// Turn an arbitrary string into a single safe path component.
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`; everything else becomes `-`.
/// Leading/trailing separators are trimmed.
pub fn sanitize_component(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = mapped.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        "artifact".to_string()
    } else {
        trimmed.to_string()
    }
}
