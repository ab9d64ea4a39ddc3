//! Slipway - resolve provider and service identifiers into cached,
//! lifecycle-managed instances

pub mod cache;
pub mod config;
pub mod error;
pub mod identifier;
pub mod manifest;
pub mod registry;
pub mod runtime;
pub mod service;
pub mod utils;

pub use cache::{ArtifactCache, ArtifactFetcher, CachedArtifact, RealFetcher};
pub use config::Config;
pub use error::{ResolveError, Result, SlipwayError};
pub use identifier::{Descriptor, Scheme};
pub use manifest::Manifest;
pub use registry::{get_instance, Instance, Provider, ProviderFactory, Registry};
pub use runtime::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use service::{Health, ServiceHandle, ServiceOrchestrator, ServiceStatus};
