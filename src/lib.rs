//! # Attune
//!
//! Backend for a mental-wellness conversational assistant. Each user turn
//! is routed to one of a closed set of reasoning capabilities; a per-user
//! behavioral profile is distilled from conversation history by a
//! background consolidation process that fires when the user goes idle.
//!
//! The core is the session/metadata orchestration layer: the dispatcher
//! that selects a capability per turn, the manager that mutates per-user
//! metadata safely under concurrent access, and the reaper that reclaims
//! idle sessions. Reasoning and retrieval are external collaborators
//! behind the [`capability`] traits.

pub mod capability;
pub mod config;
pub mod consolidation;
pub mod error;
pub mod metadata;
pub mod router;
pub mod server;
pub mod session;
pub mod users;

pub use capability::{Capability, CapabilityRegistry, Category, TurnContext};
pub use config::Settings;
pub use consolidation::{Consolidate, ConsolidationWorker};
pub use error::{
    ConsolidationError, DispatchError, ExtractionParseError, ReasoningError, StoreError,
};
pub use metadata::manager::MetadataManager;
pub use metadata::{MetadataUpdate, UserMetadata};
pub use router::Dispatcher;
pub use session::{ConversationBuffer, ConversationTurn, Role};

/// Library version.
pub const VERSION: &str = "0.1.0";
