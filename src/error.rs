//! Error types for Slipway
//!
//! This module defines the error types used throughout the crate. Lower-level
//! components (identifier parsing, artifact cache, manifest loading, service
//! orchestration) return [`SlipwayError`]. The registry boundary converts those
//! into the host-facing [`ResolveError`] classification.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Resolution Error Classification
// ============================================================================

/// Host-facing classification of a failed `Registry::get`.
///
/// `Clone` so that every caller waiting on the same in-flight resolution, and
/// every later caller hitting a cached failure, observes the same error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The identifier carries a known scheme prefix but its body is malformed.
    UnrecognizedIdentifier(String),
    /// Network or process failure while retrieving the artifact.
    FetchFailed { identifier: String, reason: String },
    /// The artifact's manifest is missing required fields or is not valid YAML.
    InvalidManifest { identifier: String, reason: String },
    /// The artifact resolved but could not be instantiated or validated.
    CreationFailed { identifier: String, reason: String },
    /// No static registration and no dynamic scheme matches the identifier.
    NotFound(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::UnrecognizedIdentifier(id) => {
                write!(f, "Unrecognized identifier '{}'", id)
            }
            ResolveError::FetchFailed { identifier, reason } => {
                write!(f, "Fetch failed for '{}': {}", identifier, reason)
            }
            ResolveError::InvalidManifest { identifier, reason } => {
                write!(f, "Invalid manifest for '{}': {}", identifier, reason)
            }
            ResolveError::CreationFailed { identifier, reason } => {
                write!(f, "Creation failed for '{}': {}", identifier, reason)
            }
            ResolveError::NotFound(id) => write!(f, "No provider or service found for '{}'", id),
        }
    }
}

impl std::error::Error for ResolveError {}

impl ResolveError {
    /// Convert a component error into the registry taxonomy for `identifier`.
    ///
    /// Anything that is not a parse, fetch, manifest or lookup failure is an
    /// instantiation failure from the host's point of view.
    pub fn classify(identifier: &str, err: SlipwayError) -> Self {
        let identifier = identifier.to_string();
        match err {
            SlipwayError::UnrecognizedIdentifier(_) => {
                ResolveError::UnrecognizedIdentifier(identifier)
            }
            SlipwayError::FetchFailed(reason) => ResolveError::FetchFailed { identifier, reason },
            SlipwayError::InvalidManifest(reason) => {
                ResolveError::InvalidManifest { identifier, reason }
            }
            SlipwayError::Yaml(e) => ResolveError::InvalidManifest {
                identifier,
                reason: e.to_string(),
            },
            SlipwayError::NotFound(_) => ResolveError::NotFound(identifier),
            SlipwayError::CreationFailed(reason) => {
                ResolveError::CreationFailed { identifier, reason }
            }
            other => ResolveError::CreationFailed {
                identifier,
                reason: other.to_string(),
            },
        }
    }

    /// Identifier the failure refers to.
    pub fn identifier(&self) -> &str {
        match self {
            ResolveError::UnrecognizedIdentifier(id) | ResolveError::NotFound(id) => id,
            ResolveError::FetchFailed { identifier, .. }
            | ResolveError::InvalidManifest { identifier, .. }
            | ResolveError::CreationFailed { identifier, .. } => identifier,
        }
    }

    /// Short machine-friendly kind label (used in logs and CLI output).
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::UnrecognizedIdentifier(_) => "unrecognized_identifier",
            ResolveError::FetchFailed { .. } => "fetch_failed",
            ResolveError::InvalidManifest { .. } => "invalid_manifest",
            ResolveError::CreationFailed { .. } => "creation_failed",
            ResolveError::NotFound(_) => "not_found",
        }
    }
}

impl From<ResolveError> for SlipwayError {
    fn from(err: ResolveError) -> Self {
        SlipwayError::Resolve(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for Slipway operations.
#[derive(Error, Debug)]
pub enum SlipwayError {
    /// No identifier scheme matched, or the scheme body is malformed.
    #[error("Unrecognized identifier: {0}")]
    UnrecognizedIdentifier(String),

    /// Artifact retrieval failed (clone, pack, extraction, missing manifest).
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// Manifest missing required fields or unparseable.
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// Instantiation or capability validation failed.
    #[error("Creation failed: {0}")]
    CreationFailed(String),

    /// Resource not found (static registration, cached entry, container)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Container orchestration CLI failures.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// Process plugin protocol failures.
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// Configuration-related errors (invalid config, unknown fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A bounded operation exceeded its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A nested resolution failed (e.g. a provider's backing service).
    #[error("{0}")]
    Resolve(ResolveError),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized `Result` type for Slipway operations.
pub type Result<T> = std::result::Result<T, SlipwayError>;
