//! Ephemeral per-user conversation state.
//!
//! Turns live only in the in-process buffer: they are handed to the
//! consolidation worker as a snapshot and discarded once consolidated,
//! never persisted verbatim.

pub mod activity;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Capability,
}

/// One message in the active session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn capability(text: impl Into<String>) -> Self {
        Self {
            role: Role::Capability,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Per-user buffers of not-yet-consolidated turns.
///
/// The turn-handling path appends; the consolidation worker takes a
/// snapshot (a copy, never a live reference) and later discards exactly the
/// prefix it consolidated, so turns arriving mid-extraction are kept.
#[derive(Default)]
pub struct ConversationBuffer {
    turns: DashMap<String, Vec<ConversationTurn>>,
}

impl ConversationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, user_id: &str, turn: ConversationTurn) {
        self.turns.entry(user_id.to_string()).or_default().push(turn);
    }

    /// Copy of the user's buffered turns at this instant.
    pub fn snapshot(&self, user_id: &str) -> Vec<ConversationTurn> {
        self.turns
            .get(user_id)
            .map(|turns| turns.clone())
            .unwrap_or_default()
    }

    /// Drop the first `count` turns — the prefix a successful consolidation
    /// covered. Anything appended after the snapshot survives.
    pub fn discard_prefix(&self, user_id: &str, count: usize) {
        if let Some(mut turns) = self.turns.get_mut(user_id) {
            let count = count.min(turns.len());
            turns.drain(..count);
        }
    }

    pub fn len(&self, user_id: &str) -> usize {
        self.turns.get(user_id).map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, user_id: &str) -> bool {
        self.len(user_id) == 0
    }
}

/// Render turns as `role: text` lines for prompt assembly.
pub fn render_transcript(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Capability => "assistant",
            };
            format!("{role}: {text}", text = turn.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
