//! Registry types: resolved instances, entries and extension points.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::CachedArtifact;
use crate::error::{ResolveError, Result};
use crate::manifest::Manifest;
use crate::service::ServiceHandle;

/// A capability adapter.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable adapter id (non-empty).
    fn id(&self) -> &str;

    /// Capabilities this adapter implements (e.g. `text-to-audio`).
    fn capabilities(&self) -> Vec<String>;

    /// Call `method` with JSON params.
    async fn invoke(&self, method: &str, params: Value) -> Result<Value>;
}

/// What `Registry::get` hands out.
#[derive(Clone)]
pub enum Instance {
    Provider(Arc<dyn Provider>),
    Service(Arc<dyn ServiceHandle>),
}

impl Instance {
    pub fn kind(&self) -> &'static str {
        match self {
            Instance::Provider(_) => "provider",
            Instance::Service(_) => "service",
        }
    }

    pub fn as_provider(&self) -> Option<&Arc<dyn Provider>> {
        match self {
            Instance::Provider(p) => Some(p),
            Instance::Service(_) => None,
        }
    }

    pub fn as_service(&self) -> Option<&Arc<dyn ServiceHandle>> {
        match self {
            Instance::Service(s) => Some(s),
            Instance::Provider(_) => None,
        }
    }

    /// Display name: provider id or service name.
    pub fn name(&self) -> &str {
        match self {
            Instance::Provider(p) => p.id(),
            Instance::Service(s) => s.name(),
        }
    }

    /// Whether both point at the same underlying object.
    pub fn same_as(&self, other: &Instance) -> bool {
        match (self, other) {
            (Instance::Provider(a), Instance::Provider(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (Instance::Service(a), Instance::Service(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Fetching,
    Ready,
    Failed,
}

/// One registry slot, keyed by the raw identifier string.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub identifier: String,
    pub state: EntryState,
    pub instance: Option<Instance>,
    pub error: Option<ResolveError>,
    pub updated_at: DateTime<Utc>,
}

impl RegistryEntry {
    pub fn fetching(identifier: &str, since: DateTime<Utc>) -> Self {
        Self {
            identifier: identifier.to_string(),
            state: EntryState::Fetching,
            instance: None,
            error: None,
            updated_at: since,
        }
    }

    pub fn from_outcome(
        identifier: &str,
        outcome: &std::result::Result<Instance, ResolveError>,
    ) -> Self {
        let (state, instance, error) = match outcome {
            Ok(instance) => (EntryState::Ready, Some(instance.clone()), None),
            Err(e) => (EntryState::Failed, None, Some(e.clone())),
        };
        Self {
            identifier: identifier.to_string(),
            state,
            instance,
            error,
            updated_at: Utc::now(),
        }
    }

    /// The stored result, for entries that are no longer fetching.
    pub fn outcome(&self) -> Option<std::result::Result<Instance, ResolveError>> {
        match (&self.instance, &self.error) {
            (Some(instance), _) => Some(Ok(instance.clone())),
            (None, Some(error)) => Some(Err(error.clone())),
            (None, None) => None,
        }
    }
}

/// Snapshot counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub entries: usize,
    pub ready: usize,
    pub fetching: usize,
    pub failed: usize,
    pub providers: usize,
    pub services: usize,
    pub static_registrations: usize,
    /// Completed resolution sequences since startup.
    pub resolutions: u64,
}

/// Everything a provider factory gets to build an adapter.
#[derive(Clone)]
pub struct ProviderContext {
    pub identifier: String,
    pub manifest: Manifest,
    pub artifact: CachedArtifact,
    /// Backing service resolved from the manifest's `serviceUrl`.
    pub service: Option<Arc<dyn ServiceHandle>>,
}

/// Builds a provider from a resolved artifact. Registered per manifest
/// `id` or `type`.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, ctx: &ProviderContext) -> Result<Arc<dyn Provider>>;
}

impl<F> ProviderFactory for F
where
    F: Fn(&ProviderContext) -> Result<Arc<dyn Provider>> + Send + Sync,
{
    fn create(&self, ctx: &ProviderContext) -> Result<Arc<dyn Provider>> {
        self(ctx)
    }
}

/// Constructor for a statically registered identifier.
pub type StaticConstructor = Arc<dyn Fn() -> Result<Instance> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Provider for Echo {
        fn id(&self) -> &str {
            "echo"
        }
        fn capabilities(&self) -> Vec<String> {
            vec!["text-to-text".into()]
        }
        async fn invoke(&self, _method: &str, params: Value) -> Result<Value> {
            Ok(params)
        }
    }

    #[test]
    fn test_instance_identity() {
        let a = Instance::Provider(Arc::new(Echo));
        let b = a.clone();
        let c = Instance::Provider(Arc::new(Echo));
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert_eq!(a.kind(), "provider");
        assert_eq!(a.name(), "echo");
        assert!(a.as_service().is_none());
    }

    #[test]
    fn test_entry_from_outcome() {
        let ok = RegistryEntry::from_outcome("x", &Ok(Instance::Provider(Arc::new(Echo))));
        assert_eq!(ok.state, EntryState::Ready);
        assert!(matches!(ok.outcome(), Some(Ok(_))));

        let err = RegistryEntry::from_outcome("x", &Err(ResolveError::NotFound("x".into())));
        assert_eq!(err.state, EntryState::Failed);
        assert!(matches!(err.outcome(), Some(Err(ResolveError::NotFound(_)))));

        assert!(RegistryEntry::fetching("x", Utc::now()).outcome().is_none());
    }

    #[test]
    fn test_closure_factory() {
        let factory = |_: &ProviderContext| -> Result<Arc<dyn Provider>> { Ok(Arc::new(Echo)) };
        let ctx = ProviderContext {
            identifier: "npm:echo".into(),
            manifest: Manifest::default(),
            artifact: CachedArtifact {
                identifier: "npm:echo".into(),
                local_path: "/tmp".into(),
                manifest_path: "/tmp/manifest.yaml".into(),
                managed: true,
            },
            service: None,
        };
        assert_eq!(factory.create(&ctx).unwrap().id(), "echo");
    }
}
