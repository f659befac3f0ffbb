//! Error taxonomy for the orchestration core.
//!
//! Each failure mode a caller can meaningfully react to gets its own type:
//! store connectivity, reasoning-provider failures, dispatch failures, and
//! malformed extractor output. Lock poisoning cannot occur — every critical
//! section is an async mutex guard released on all exit paths.

use thiserror::Error;

use crate::capability::Category;

/// Errors from the metadata store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The persistence backend is unreachable. Retryable; the in-memory
    /// cache remains authoritative until the store recovers.
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),

    /// A persisted document could not be decoded.
    #[error("stored metadata document is malformed: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors from a reasoning capability invocation.
#[derive(Debug, Error)]
pub enum ReasoningError {
    /// Transport-level failure (connection refused, timeout, TLS).
    #[error("reasoning provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a non-retryable error status.
    #[error("reasoning provider returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Retries exhausted against a rate-limited or failing provider.
    #[error("reasoning provider unavailable after {attempts} attempts: {message}")]
    Exhausted { attempts: u32, message: String },

    /// The provider replied 200 but the body had no usable completion.
    #[error("reasoning provider reply was malformed: {0}")]
    Malformed(String),

    /// The capability cannot be constructed or invoked as configured.
    #[error("reasoning capability misconfigured: {0}")]
    Configuration(String),
}

/// Errors from routing a turn. No fallback capability is invoked and no
/// partial reply is ever returned; the caller decides whether to retry.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Metadata could not be loaded for the context bundle.
    #[error("failed to load metadata for routing: {0}")]
    Metadata(#[from] StoreError),

    /// The delegated category-selection step failed.
    #[error("category selection failed: {0}")]
    Classification(#[source] ReasoningError),

    /// The selected capability failed.
    #[error("{category} capability failed: {source}")]
    Capability {
        category: Category,
        #[source]
        source: ReasoningError,
    },
}

/// The extraction capability returned output that could not be parsed into
/// a structured metadata update.
#[derive(Debug, Error)]
#[error("extractor reply could not be parsed: {reason}")]
pub struct ExtractionParseError {
    pub reason: String,
}

impl ExtractionParseError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors from a consolidation run. On any of these the conversation buffer
/// is retained for a future attempt.
#[derive(Debug, Error)]
pub enum ConsolidationError {
    /// The extraction capability itself failed.
    #[error("extraction capability failed: {0}")]
    Extraction(#[source] ReasoningError),

    #[error(transparent)]
    Parse(#[from] ExtractionParseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
