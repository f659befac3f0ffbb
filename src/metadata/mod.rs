//! Per-user behavioral metadata: the durable record distilled from
//! conversation history, and the partial-update type it is merged with.
//!
//! Merging is a pure function with a fixed per-field policy: set-valued
//! fields are unioned, map-valued fields are overwritten key-wise, and
//! `last_interaction` is stamped with the merge time. The policy makes
//! merges associative, so interleaved consolidations never lose updates.

pub mod manager;
pub mod store;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable behavioral profile for one user. Exactly one live record per
/// `user_id`; never deleted, only merged into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    /// Opaque stable identifier (primary key).
    pub user_id: String,
    /// Identifier for the current consolidation epoch. Regenerated when the
    /// record is first created and again on every successful consolidation.
    pub session_id: String,
    #[serde(default)]
    pub stress_triggers: BTreeSet<String>,
    #[serde(default)]
    pub indecisiveness_triggers: BTreeSet<String>,
    #[serde(default)]
    pub preferred_tools: BTreeSet<String>,
    /// Pattern name to free-text description.
    #[serde(default)]
    pub decision_patterns: BTreeMap<String, String>,
    /// Timestamp of the last successful consolidation.
    pub last_interaction: DateTime<Utc>,
}

impl UserMetadata {
    /// Default record for a user seen for the first time: empty sets and a
    /// freshly generated session id.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: Uuid::new_v4().to_string(),
            stress_triggers: BTreeSet::new(),
            indecisiveness_triggers: BTreeSet::new(),
            preferred_tools: BTreeSet::new(),
            decision_patterns: BTreeMap::new(),
            last_interaction: Utc::now(),
        }
    }
}

/// Partial update produced by the extraction capability. Only fields that
/// are present change the record; everything else is left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataUpdate {
    /// Rotates the consolidation epoch when present.
    pub session_id: Option<String>,
    pub stress_triggers: Option<Vec<String>>,
    pub indecisiveness_triggers: Option<Vec<String>>,
    pub preferred_tools: Option<Vec<String>>,
    pub decision_patterns: Option<BTreeMap<String, String>>,
}

impl MetadataUpdate {
    /// True when the update would change nothing but `last_interaction`.
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none()
            && self.stress_triggers.is_none()
            && self.indecisiveness_triggers.is_none()
            && self.preferred_tools.is_none()
            && self.decision_patterns.is_none()
    }
}

/// Apply `update` to `current` under the per-field merge policy.
///
/// Sets are unioned (duplicates suppressed), maps are overwritten key-wise,
/// `session_id` is replaced when present, and `last_interaction` is set to
/// `at`.
pub fn merge(current: &UserMetadata, update: &MetadataUpdate, at: DateTime<Utc>) -> UserMetadata {
    let mut merged = current.clone();

    if let Some(ref session_id) = update.session_id {
        merged.session_id = session_id.clone();
    }
    if let Some(ref triggers) = update.stress_triggers {
        merged.stress_triggers.extend(triggers.iter().cloned());
    }
    if let Some(ref triggers) = update.indecisiveness_triggers {
        merged
            .indecisiveness_triggers
            .extend(triggers.iter().cloned());
    }
    if let Some(ref tools) = update.preferred_tools {
        merged.preferred_tools.extend(tools.iter().cloned());
    }
    if let Some(ref patterns) = update.decision_patterns {
        for (name, description) in patterns {
            merged
                .decision_patterns
                .insert(name.clone(), description.clone());
        }
    }
    merged.last_interaction = at;

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update_with_triggers(triggers: &[&str]) -> MetadataUpdate {
        MetadataUpdate {
            stress_triggers: Some(triggers.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_record_has_empty_fields_and_fresh_session() {
        let a = UserMetadata::new("u1");
        let b = UserMetadata::new("u2");
        assert!(a.stress_triggers.is_empty());
        assert!(a.decision_patterns.is_empty());
        assert!(!a.session_id.is_empty());
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn test_merge_unions_sets() {
        let now = Utc::now();
        let base = UserMetadata::new("u1");
        let merged = merge(&base, &update_with_triggers(&["perfectionism"]), now);
        let merged = merge(&merged, &update_with_triggers(&["time pressure"]), now);

        let expected: BTreeSet<String> = ["perfectionism", "time pressure"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(merged.stress_triggers, expected);
    }

    #[test]
    fn test_merge_suppresses_duplicates() {
        let now = Utc::now();
        let base = UserMetadata::new("u1");
        let merged = merge(&base, &update_with_triggers(&["overthinking", "overthinking"]), now);
        let merged = merge(&merged, &update_with_triggers(&["overthinking"]), now);
        assert_eq!(merged.stress_triggers.len(), 1);
    }

    #[test]
    fn test_merge_overwrites_map_keywise() {
        let now = Utc::now();
        let base = UserMetadata::new("u1");

        let first = MetadataUpdate {
            decision_patterns: Some(BTreeMap::from([
                ("finance".to_string(), "avoids money decisions".to_string()),
                ("career".to_string(), "defers to others".to_string()),
            ])),
            ..Default::default()
        };
        let second = MetadataUpdate {
            decision_patterns: Some(BTreeMap::from([(
                "finance".to_string(),
                "delays money decisions for weeks".to_string(),
            )])),
            ..Default::default()
        };

        let merged = merge(&merge(&base, &first, now), &second, now);
        assert_eq!(
            merged.decision_patterns["finance"],
            "delays money decisions for weeks"
        );
        assert_eq!(merged.decision_patterns["career"], "defers to others");
    }

    #[test]
    fn test_merge_is_associative_per_field_policy() {
        let now = Utc::now();
        let base = UserMetadata::new("u1");

        let u1 = MetadataUpdate {
            stress_triggers: Some(vec!["perfectionism".to_string()]),
            preferred_tools: Some(vec!["body scan".to_string()]),
            ..Default::default()
        };
        let u2 = MetadataUpdate {
            stress_triggers: Some(vec!["time pressure".to_string()]),
            ..Default::default()
        };

        // Field-wise union of u1 and u2 applied once.
        let combined = MetadataUpdate {
            stress_triggers: Some(vec![
                "perfectionism".to_string(),
                "time pressure".to_string(),
            ]),
            preferred_tools: Some(vec!["body scan".to_string()]),
            ..Default::default()
        };

        let sequential = merge(&merge(&base, &u1, now), &u2, now);
        let batched = merge(&base, &combined, now);
        assert_eq!(sequential, batched);
    }

    #[test]
    fn test_merge_rotates_session_when_present() {
        let now = Utc::now();
        let base = UserMetadata::new("u1");
        let old_session = base.session_id.clone();

        let merged = merge(&base, &MetadataUpdate::default(), now);
        assert_eq!(merged.session_id, old_session);

        let update = MetadataUpdate {
            session_id: Some("epoch-2".to_string()),
            ..Default::default()
        };
        let merged = merge(&merged, &update, now);
        assert_eq!(merged.session_id, "epoch-2");
    }

    #[test]
    fn test_merge_stamps_last_interaction() {
        let base = UserMetadata::new("u1");
        let later = base.last_interaction + chrono::Duration::seconds(90);
        let merged = merge(&base, &MetadataUpdate::default(), later);
        assert_eq!(merged.last_interaction, later);
    }
}
