//! Process-wide registry of resolved providers and services.
//!
//! `get(identifier)` returns a cached instance or resolves it:
//!
//! 1. static registrations (`register`)
//! 2. parse the identifier
//! 3. fetch the artifact into the cache
//! 4. load its manifest (fresh from disk)
//! 5. instantiate: a service manifest yields a [`ServiceOrchestrator`]; a
//!    provider manifest resolves its `serviceUrl` through this same registry
//!    and is built by a registered [`ProviderFactory`] or, failing that, its
//!    `entrypoint` plugin
//!
//! Concurrent `get`s for the same identifier share one resolution: the first
//! caller owns it and publishes the outcome on a `watch` channel, every other
//! caller awaits that channel. Outcomes (including failures) are cached until
//! `refresh` or `clear_cache`.

pub mod plugin;
pub mod types;

pub use plugin::{PluginProvider, SERVICE_URL_ENV};
pub use types::{
    EntryState, Instance, Provider, ProviderContext, ProviderFactory, RegistryEntry,
    RegistryStats, StaticConstructor,
};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{ArtifactCache, CachedArtifact};
use crate::config::Config;
use crate::error::{ResolveError, Result, SlipwayError};
use crate::identifier;
use crate::log_component;
use crate::manifest::{self, Manifest};
use crate::runtime::{CommandRunner, SystemRunner};
use crate::service::{
    HealthProbe, HttpProbe, OrchestratorSettings, PortAllocator, PortLedger, ServiceOrchestrator,
};

type Outcome = std::result::Result<Instance, ResolveError>;

enum Slot {
    Fetching {
        rx: watch::Receiver<Option<Outcome>>,
        since: DateTime<Utc>,
    },
    Done(RegistryEntry),
}

impl Slot {
    /// Give back host ports held by a finished service entry.
    fn release(self) {
        if let Slot::Done(RegistryEntry {
            instance: Some(Instance::Service(service)),
            ..
        }) = self
        {
            service.release_ports();
        }
    }
}

/// Clears the in-flight marker if the owning resolution is dropped before it
/// publishes, so waiters retry instead of hanging.
struct InFlight<'a> {
    slots: &'a Mutex<HashMap<String, Slot>>,
    identifier: &'a str,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slots = self.slots.lock().unwrap();
        if matches!(slots.get(self.identifier), Some(Slot::Fetching { .. })) {
            slots.remove(self.identifier);
        }
    }
}

/// Identifier → instance registry with single-flight resolution.
pub struct Registry {
    cache: Arc<ArtifactCache>,
    runner: Arc<dyn CommandRunner>,
    allocator: PortAllocator,
    probe: Arc<dyn HealthProbe>,
    settings: OrchestratorSettings,
    resolve_timeout: Duration,
    statics: RwLock<HashMap<String, StaticConstructor>>,
    factories: RwLock<HashMap<String, Arc<dyn ProviderFactory>>>,
    slots: Mutex<HashMap<String, Slot>>,
    resolutions: AtomicU64,
}

impl Registry {
    /// Registry over `cache`, running service commands with `runner`.
    pub fn new(cache: Arc<ArtifactCache>, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        Ok(Self {
            cache,
            runner,
            allocator: PortAllocator::new(Arc::new(PortLedger::new()), "127.0.0.1"),
            probe: Arc::new(HttpProbe::new()?),
            settings: OrchestratorSettings::default(),
            resolve_timeout: Duration::from_secs(crate::config::DEFAULT_RESOLVE_TIMEOUT_SECS),
            statics: RwLock::new(HashMap::new()),
            factories: RwLock::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
            resolutions: AtomicU64::new(0),
        })
    }

    /// Build from configuration with the host process runner.
    pub fn from_config(config: &Config) -> Result<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new());
        let cache = Arc::new(ArtifactCache::from_config(&config.cache, runner.clone()));
        Ok(Self::new(cache, runner)?
            .with_settings(OrchestratorSettings::from(&config.services))
            .with_port_allocator(PortAllocator::new(
                Arc::new(PortLedger::new()),
                config.services.bind_host.clone(),
            ))
            .with_resolve_timeout(Duration::from_secs(config.registry.resolve_timeout_secs)))
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_port_allocator(mut self, allocator: PortAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Bound for one resolution, and for how long a waiter waits on it.
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    pub fn port_ledger(&self) -> &Arc<PortLedger> {
        self.allocator.ledger()
    }

    /// Register a compile-time-known identifier.
    pub fn register<F>(&self, static_id: &str, constructor: F)
    where
        F: Fn() -> Result<Instance> + Send + Sync + 'static,
    {
        self.statics
            .write()
            .unwrap()
            .insert(static_id.to_string(), Arc::new(constructor));
    }

    /// Register a provider factory for manifests whose `id` or `type` is `key`.
    pub fn register_factory<F>(&self, key: &str, factory: F)
    where
        F: ProviderFactory + 'static,
    {
        self.factories
            .write()
            .unwrap()
            .insert(key.to_string(), Arc::new(factory));
    }

    pub fn is_registered(&self, static_id: &str) -> bool {
        self.statics.read().unwrap().contains_key(static_id)
    }

    /// Resolve `identifier` to an instance, sharing in-flight work.
    pub async fn get(&self, identifier: &str) -> Outcome {
        self.get_chain(identifier.to_string(), Vec::new()).await
    }

    fn get_chain(&self, identifier: String, chain: Vec<String>) -> BoxFuture<'_, Outcome> {
        Box::pin(async move {
            let tx = {
                let mut slots = self.slots.lock().unwrap();
                match slots.get(&identifier) {
                    Some(Slot::Done(entry)) => {
                        if let Some(outcome) = entry.outcome() {
                            return outcome;
                        }
                        None
                    }
                    Some(Slot::Fetching { rx, .. }) => Some(Err(rx.clone())),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        slots.insert(
                            identifier.clone(),
                            Slot::Fetching {
                                rx,
                                since: Utc::now(),
                            },
                        );
                        Some(Ok(tx))
                    }
                }
            };

            match tx {
                Some(Ok(tx)) => self.own(identifier, chain, tx).await,
                Some(Err(rx)) => self.wait(identifier, chain, rx).await,
                None => Err(ResolveError::CreationFailed {
                    reason: "registry entry has no outcome".to_string(),
                    identifier,
                }),
            }
        })
    }

    async fn own(
        &self,
        identifier: String,
        chain: Vec<String>,
        tx: watch::Sender<Option<Outcome>>,
    ) -> Outcome {
        let guard = InFlight {
            slots: &self.slots,
            identifier: &identifier,
            armed: true,
        };

        let outcome = match tokio::time::timeout(
            self.resolve_timeout,
            self.resolve(&identifier, &chain),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ResolveError::classify(
                &identifier,
                SlipwayError::Timeout(format!(
                    "resolution exceeded {}s",
                    self.resolve_timeout.as_secs()
                )),
            )),
        };
        self.resolutions.fetch_add(1, Ordering::SeqCst);

        match &outcome {
            Ok(instance) => {
                log_component!(info, "registry", "Resolved", identifier = %identifier, kind = instance.kind())
            }
            Err(e) => {
                log_component!(warn, "registry", "Resolution failed", identifier = %identifier, error = %e)
            }
        }

        self.slots.lock().unwrap().insert(
            identifier.clone(),
            Slot::Done(RegistryEntry::from_outcome(&identifier, &outcome)),
        );
        guard.disarm();
        let _ = tx.send(Some(outcome.clone()));
        outcome
    }

    async fn wait(
        &self,
        identifier: String,
        chain: Vec<String>,
        mut rx: watch::Receiver<Option<Outcome>>,
    ) -> Outcome {
        debug!(identifier = %identifier, "Waiting for in-flight resolution");
        let waited = tokio::time::timeout(self.resolve_timeout, async {
            rx.wait_for(Option::is_some)
                .await
                .map(|value| value.clone())
        })
        .await;

        match waited {
            Ok(Ok(Some(outcome))) => outcome,
            // Owner dropped without publishing; try again.
            Ok(Ok(None)) | Ok(Err(_)) => self.get_chain(identifier, chain).await,
            Err(_) => Err(ResolveError::classify(
                &identifier,
                SlipwayError::Timeout(format!(
                    "waited {}s for in-flight resolution",
                    self.resolve_timeout.as_secs()
                )),
            )),
        }
    }

    async fn resolve(&self, identifier: &str, chain: &[String]) -> Outcome {
        let constructor = self.statics.read().unwrap().get(identifier).cloned();
        if let Some(constructor) = constructor {
            return constructor().map_err(|e| ResolveError::CreationFailed {
                identifier: identifier.to_string(),
                reason: e.to_string(),
            });
        }

        let descriptor = match identifier::parse(identifier) {
            Ok(d) => d,
            Err(_) if identifier::has_known_prefix(identifier) => {
                return Err(ResolveError::UnrecognizedIdentifier(identifier.to_string()))
            }
            Err(_) => return Err(ResolveError::NotFound(identifier.to_string())),
        };

        let artifact = self
            .cache
            .fetch(identifier, &descriptor)
            .await
            .map_err(|e| ResolveError::classify(identifier, e))?;

        // A manifest that fails validation keeps its directory for inspection.
        let manifest = manifest::load(&artifact)
            .await
            .map_err(|e| ResolveError::classify(identifier, e))?;

        match self
            .instantiate(identifier, chain, manifest, artifact.clone())
            .await
        {
            Ok(instance) => Ok(instance),
            Err(err) => {
                if let Err(e) = self.cache.evict_artifact(&artifact).await {
                    warn!(identifier = %identifier, error = %e, "Could not remove artifact");
                }
                Err(err)
            }
        }
    }

    async fn instantiate(
        &self,
        identifier: &str,
        chain: &[String],
        manifest: Manifest,
        artifact: CachedArtifact,
    ) -> Outcome {
        let creation_failed = |reason: String| ResolveError::CreationFailed {
            identifier: identifier.to_string(),
            reason,
        };

        if manifest.is_service() {
            let orchestrator = ServiceOrchestrator::new(
                manifest,
                artifact,
                self.allocator.clone(),
                self.runner.clone(),
                self.probe.clone(),
                self.settings.clone(),
            )
            .map_err(|e| ResolveError::classify(identifier, e))?
            .with_cache(self.cache.clone());
            return Ok(Instance::Service(Arc::new(orchestrator)));
        }

        let service = match manifest
            .service_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(url) if url == identifier || chain.iter().any(|c| c == url) => {
                return Err(creation_failed(format!(
                    "serviceUrl '{}' refers back to a provider being resolved",
                    url
                )));
            }
            Some(url) => {
                let mut next = chain.to_vec();
                next.push(identifier.to_string());
                match self.get_chain(url.to_string(), next).await {
                    Ok(Instance::Service(service)) => Some(service),
                    Ok(Instance::Provider(_)) => {
                        return Err(creation_failed(format!(
                            "serviceUrl '{}' resolves to a provider, not a service",
                            url
                        )));
                    }
                    Err(e) => return Err(creation_failed(format!("backing service: {}", e))),
                }
            }
            None => None,
        };

        let ctx = ProviderContext {
            identifier: identifier.to_string(),
            manifest,
            artifact,
            service,
        };
        let provider = self.create_provider(&ctx)?;
        validate_provider(&ctx.manifest, provider.as_ref()).map_err(creation_failed)?;
        Ok(Instance::Provider(provider))
    }

    fn create_provider(&self, ctx: &ProviderContext) -> std::result::Result<Arc<dyn Provider>, ResolveError> {
        let factory = {
            let factories = self.factories.read().unwrap();
            ctx.manifest
                .id
                .as_deref()
                .and_then(|id| factories.get(id))
                .or_else(|| ctx.manifest.kind.as_deref().and_then(|k| factories.get(k)))
                .cloned()
        };

        if let Some(factory) = factory {
            return factory.create(ctx).map_err(|e| ResolveError::CreationFailed {
                identifier: ctx.identifier.clone(),
                reason: e.to_string(),
            });
        }
        if let Some(plugin) = PluginProvider::from_context(ctx) {
            return Ok(Arc::new(plugin));
        }
        Err(ResolveError::CreationFailed {
            identifier: ctx.identifier.clone(),
            reason: format!(
                "no factory registered for '{}' and no entrypoint declared",
                ctx.manifest.display_id()
            ),
        })
    }

    /// Resolved providers that report `capability`.
    pub fn get_providers_by_capability(&self, capability: &str) -> Vec<Arc<dyn Provider>> {
        let slots = self.slots.lock().unwrap();
        let mut found: Vec<(String, Arc<dyn Provider>)> = slots
            .iter()
            .filter_map(|(id, slot)| match slot {
                Slot::Done(RegistryEntry {
                    instance: Some(Instance::Provider(p)),
                    ..
                }) if p.capabilities().iter().any(|c| c == capability) => {
                    Some((id.clone(), p.clone()))
                }
                _ => None,
            })
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found.into_iter().map(|(_, p)| p).collect()
    }

    /// Drop the cached entry and its on-disk artifact so the next `get`
    /// resolves from scratch. An in-flight resolution is left alone.
    ///
    /// Returns whether an entry was removed.
    pub async fn refresh(&self, identifier: &str) -> Result<bool> {
        let removed = {
            let mut slots = self.slots.lock().unwrap();
            match slots.get(identifier) {
                Some(Slot::Fetching { .. }) => return Ok(false),
                Some(Slot::Done(_)) => slots.remove(identifier),
                None => None,
            }
        };
        let removed = match removed {
            Some(slot) => {
                slot.release();
                true
            }
            None => false,
        };

        if !self.is_registered(identifier) {
            if let Ok(descriptor) = identifier::parse(identifier) {
                self.cache.evict(&descriptor).await?;
            }
        }
        info!(identifier = %identifier, removed, "Refreshed");
        Ok(removed)
    }

    /// Drop every finished entry. In-flight resolutions are kept.
    ///
    /// Returns the number of entries removed.
    pub fn clear_cache(&self) -> usize {
        let finished: Vec<Slot> = {
            let mut slots = self.slots.lock().unwrap();
            let ids: Vec<String> = slots
                .iter()
                .filter(|(_, slot)| matches!(slot, Slot::Done(_)))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| slots.remove(id)).collect()
        };
        let count = finished.len();
        finished.into_iter().for_each(Slot::release);
        count
    }

    pub fn stats(&self) -> RegistryStats {
        let slots = self.slots.lock().unwrap();
        let mut stats = RegistryStats {
            entries: slots.len(),
            static_registrations: self.statics.read().unwrap().len(),
            resolutions: self.resolutions.load(Ordering::SeqCst),
            ..Default::default()
        };
        for slot in slots.values() {
            match slot {
                Slot::Fetching { .. } => stats.fetching += 1,
                Slot::Done(entry) => match (&entry.state, &entry.instance) {
                    (EntryState::Ready, Some(Instance::Provider(_))) => {
                        stats.ready += 1;
                        stats.providers += 1;
                    }
                    (EntryState::Ready, Some(Instance::Service(_))) => {
                        stats.ready += 1;
                        stats.services += 1;
                    }
                    (EntryState::Ready, None) => stats.ready += 1,
                    _ => stats.failed += 1,
                },
            }
        }
        stats
    }

    /// Snapshot of all entries, sorted by identifier.
    pub fn entries(&self) -> Vec<RegistryEntry> {
        let slots = self.slots.lock().unwrap();
        let mut entries: Vec<RegistryEntry> = slots
            .iter()
            .map(|(id, slot)| match slot {
                Slot::Fetching { since, .. } => RegistryEntry::fetching(id, *since),
                Slot::Done(entry) => entry.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        entries
    }
}

/// Every capability the manifest declares must be reported by the adapter.
fn validate_provider(manifest: &Manifest, provider: &dyn Provider) -> std::result::Result<(), String> {
    if provider.id().trim().is_empty() {
        return Err("provider reports an empty id".to_string());
    }
    let reported = provider.capabilities();
    let missing: Vec<&str> = manifest
        .capabilities
        .iter()
        .filter(|c| !reported.contains(c))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "provider '{}' does not implement declared capabilities: {}",
            provider.id(),
            missing.join(", ")
        ))
    }
}

static GLOBAL: OnceCell<Arc<Registry>> = OnceCell::new();

impl Registry {
    /// The process-wide registry, built from `~/.slipway/config.json` on first use.
    pub fn global() -> Result<Arc<Registry>> {
        GLOBAL
            .get_or_try_init(|| Registry::from_config(&Config::load()?).map(Arc::new))
            .cloned()
    }
}

/// Resolve `identifier` through the process-wide registry.
pub async fn get_instance(identifier: &str) -> Result<Instance> {
    Ok(Registry::global()?.get(identifier).await?)
}
