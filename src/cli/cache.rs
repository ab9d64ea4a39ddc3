//! Artifact cache commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use slipway::cache::ArtifactCache;
use slipway::runtime::SystemRunner;

use super::common::load_config;
use super::CacheAction;

pub(crate) async fn cmd_cache(config: Option<&Path>, action: CacheAction) -> Result<()> {
    let config = load_config(config)?;
    match action {
        CacheAction::Path => {
            println!("{}", config.cache.root().display());
        }
        CacheAction::Clear => {
            let cache = ArtifactCache::from_config(&config.cache, Arc::new(SystemRunner::new()));
            cache
                .clear()
                .await
                .with_context(|| format!("Failed to clear {}", cache.root().display()))?;
            println!("Cleared {}", cache.root().display());
        }
    }
    Ok(())
}
