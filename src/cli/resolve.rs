//! Identifier commands: parse, resolve, refresh.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use slipway::identifier;
use slipway::registry::Instance;

use super::common::{build_registry, print_json};

/// Print the parsed descriptor for an identifier.
pub(crate) fn cmd_parse(raw: &str) -> Result<()> {
    let descriptor =
        identifier::parse(raw).with_context(|| format!("Cannot parse identifier '{}'", raw))?;
    print_json(&json!({
        "identifier": raw,
        "scheme": descriptor.scheme,
        "location": descriptor.location,
        "reference": descriptor.reference,
        "canonical": descriptor.to_string(),
    }))
}

/// Resolve an identifier and describe the resulting instance.
pub(crate) async fn cmd_resolve(config: Option<&Path>, raw: &str) -> Result<()> {
    let registry = build_registry(config)?;
    let instance = registry.get(raw).await?;

    let detail = match &instance {
        Instance::Provider(provider) => json!({
            "identifier": raw,
            "kind": instance.kind(),
            "id": provider.id(),
            "capabilities": provider.capabilities(),
        }),
        Instance::Service(service) => json!({
            "identifier": raw,
            "kind": instance.kind(),
            "name": service.name(),
            "info": service.info().await,
        }),
    };
    print_json(&detail)
}

/// Remove the cached artifact for an identifier.
pub(crate) async fn cmd_refresh(config: Option<&Path>, raw: &str) -> Result<()> {
    let registry = build_registry(config)?;
    registry.refresh(raw).await?;

    match identifier::parse(raw) {
        Ok(descriptor) if descriptor.local_path().is_none() => {
            println!(
                "Refreshed {}; next resolve fetches into {}",
                raw,
                registry.cache().dir_for(&descriptor).display()
            );
        }
        Ok(_) => println!("{} is a local path; nothing cached to remove", raw),
        Err(_) => println!("{} is not a fetchable identifier; nothing to remove", raw),
    }
    Ok(())
}
