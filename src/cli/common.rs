//! Shared CLI helpers used across multiple command handlers.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use slipway::config::Config;
use slipway::registry::Registry;

/// Load config from `path`, or the default location.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load().context("Failed to load config"),
    }
}

/// Build a registry for one CLI invocation.
pub(crate) fn build_registry(path: Option<&Path>) -> Result<Registry> {
    let config = load_config(path)?;
    Registry::from_config(&config).context("Failed to initialize registry")
}

/// Pretty-print a value as JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
