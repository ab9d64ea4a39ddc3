//! Service lifecycle commands.

use std::path::Path;

use anyhow::{bail, Result};
use serde_json::json;

use super::common::{build_registry, print_json};
use super::ServiceAction;

/// Run a lifecycle action against a service identifier.
pub(crate) async fn cmd_service(config: Option<&Path>, action: ServiceAction) -> Result<()> {
    let registry = build_registry(config)?;
    let identifier = action.identifier().to_string();
    let instance = registry.get(&identifier).await?;
    let Some(service) = instance.as_service() else {
        bail!("'{}' is a provider, not a service", identifier);
    };

    let (verb, ok) = match action {
        ServiceAction::Status { .. } => return print_json(&service.status().await),
        ServiceAction::Info { .. } => return print_json(&service.info().await),
        ServiceAction::Start { .. } => ("start", service.start().await),
        ServiceAction::Stop { .. } => ("stop", service.stop().await),
        ServiceAction::Restart { .. } => ("restart", service.restart().await),
        ServiceAction::Cleanup { .. } => ("cleanup", service.cleanup().await),
    };

    print_json(&json!({
        "identifier": identifier,
        "action": verb,
        "ok": ok,
        "status": service.status().await,
    }))?;
    if !ok {
        bail!("{} failed for '{}'", verb, identifier);
    }
    Ok(())
}
