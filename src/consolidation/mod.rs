//! Consolidation: reduce buffered conversation turns into structured
//! metadata updates via the extraction capability.
//!
//! The worker takes a snapshot of the buffer, never a live reference, so
//! turns arriving during extraction are safe; the buffer is cleared only
//! after the merge succeeds, so no history is lost to a failed run.

pub mod reaper;

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::capability::{prompts, Capability, TurnContext};
use crate::error::{ConsolidationError, ExtractionParseError};
use crate::metadata::manager::MetadataManager;
use crate::metadata::{MetadataUpdate, UserMetadata};
use crate::session::ConversationBuffer;

/// Consolidation seam, kept narrow so the reaper can be exercised against
/// a double.
#[async_trait]
pub trait Consolidate: Send + Sync {
    async fn consolidate(&self, user_id: &str) -> Result<UserMetadata, ConsolidationError>;
}

pub struct ConsolidationWorker {
    extractor: Arc<dyn Capability>,
    metadata: Arc<MetadataManager>,
    buffer: Arc<ConversationBuffer>,
}

impl ConsolidationWorker {
    pub fn new(
        extractor: Arc<dyn Capability>,
        metadata: Arc<MetadataManager>,
        buffer: Arc<ConversationBuffer>,
    ) -> Self {
        Self {
            extractor,
            metadata,
            buffer,
        }
    }
}

#[async_trait]
impl Consolidate for ConsolidationWorker {
    /// Idempotent overwrite-on-success: extract, parse, merge, then clear
    /// exactly the consolidated prefix of the buffer. On any failure the
    /// metadata is left unchanged and the buffer survives for a future
    /// attempt.
    async fn consolidate(&self, user_id: &str) -> Result<UserMetadata, ConsolidationError> {
        let snapshot = self.buffer.snapshot(user_id);
        let current = self.metadata.get_metadata(user_id).await?;

        if snapshot.is_empty() {
            tracing::debug!(user_id, "nothing buffered, skipping consolidation");
            return Ok(current);
        }

        let ctx = TurnContext {
            metadata: current,
            history: snapshot.clone(),
            turn: prompts::EXTRACTION_REQUEST.to_string(),
        };
        let reply = self
            .extractor
            .respond(&ctx)
            .await
            .map_err(ConsolidationError::Extraction)?;

        let mut update = parse_extraction(&reply)?;
        // A successful consolidation starts a new epoch.
        update.session_id = Some(Uuid::new_v4().to_string());

        let merged = self.metadata.merge_metadata(user_id, &update).await?;
        self.buffer.discard_prefix(user_id, snapshot.len());

        tracing::info!(
            user_id,
            session_id = %merged.session_id,
            turns = snapshot.len(),
            "consolidated session into metadata"
        );
        Ok(merged)
    }
}

static JSON_OBJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("hard-coded regex"));

/// Parse the extractor's textual reply into a partial update.
///
/// The reply should be a bare JSON object, but providers like to wrap it
/// in prose or code fences, so the first balanced-looking object in the
/// text is accepted. `decision_patterns` may arrive as a name-to-text map
/// or as a bare list of pattern names; both are accepted. Unknown keys are
/// ignored.
pub fn parse_extraction(reply: &str) -> Result<MetadataUpdate, ExtractionParseError> {
    let trimmed = reply.trim();

    let parsed: Value = serde_json::from_str(trimmed)
        .ok()
        .or_else(|| {
            JSON_OBJECT_RE
                .find(reply)
                .and_then(|m| serde_json::from_str(m.as_str()).ok())
        })
        .ok_or_else(|| ExtractionParseError::new("no JSON object in reply"))?;

    let object = parsed
        .as_object()
        .ok_or_else(|| ExtractionParseError::new("reply JSON is not an object"))?;

    Ok(MetadataUpdate {
        session_id: None,
        stress_triggers: string_list(object.get("stress_triggers"))?,
        indecisiveness_triggers: string_list(object.get("indecisiveness_triggers"))?,
        preferred_tools: string_list(object.get("preferred_tools"))?,
        decision_patterns: pattern_map(object.get("decision_patterns"))?,
    })
}

fn string_list(value: Option<&Value>) -> Result<Option<Vec<String>>, ExtractionParseError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| ExtractionParseError::new("list entry is not a string"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(ExtractionParseError::new("expected a list of strings")),
    }
}

fn pattern_map(
    value: Option<&Value>,
) -> Result<Option<std::collections::BTreeMap<String, String>>, ExtractionParseError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(name, description)| {
                description
                    .as_str()
                    .map(|d| (name.clone(), d.to_string()))
                    .ok_or_else(|| ExtractionParseError::new("pattern description is not a string"))
            })
            .collect::<Result<_, _>>()
            .map(Some),
        // Lenient: a bare list of pattern names keys each name to itself.
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|s| (s.to_string(), s.to_string()))
                    .ok_or_else(|| ExtractionParseError::new("pattern entry is not a string"))
            })
            .collect::<Result<_, _>>()
            .map(Some),
        Some(_) => Err(ExtractionParseError::new(
            "expected a map or list for decision_patterns",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReasoningError;
    use crate::metadata::store::InMemoryMetadataStore;
    use crate::session::ConversationTurn;

    #[test]
    fn test_parse_bare_json_object() {
        let update = parse_extraction(
            r#"{"stress_triggers": ["perfectionism"], "preferred_tools": ["body scan"]}"#,
        )
        .unwrap();
        assert_eq!(
            update.stress_triggers,
            Some(vec!["perfectionism".to_string()])
        );
        assert_eq!(update.preferred_tools, Some(vec!["body scan".to_string()]));
        assert!(update.indecisiveness_triggers.is_none());
    }

    #[test]
    fn test_parse_json_wrapped_in_prose_and_fences() {
        let reply = "Here is the update:\n```json\n{\"stress_triggers\": [\"deadlines\"]}\n```";
        let update = parse_extraction(reply).unwrap();
        assert_eq!(update.stress_triggers, Some(vec!["deadlines".to_string()]));
    }

    #[test]
    fn test_parse_accepts_pattern_list_form() {
        let update =
            parse_extraction(r#"{"decision_patterns": ["avoids financial decisions"]}"#).unwrap();
        let patterns = update.decision_patterns.unwrap();
        assert_eq!(
            patterns["avoids financial decisions"],
            "avoids financial decisions"
        );
    }

    #[test]
    fn test_parse_rejects_missing_json() {
        assert!(parse_extraction("I could not extract anything, sorry.").is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_shapes() {
        assert!(parse_extraction(r#"{"stress_triggers": "not a list"}"#).is_err());
        assert!(parse_extraction(r#"{"stress_triggers": [42]}"#).is_err());
        assert!(parse_extraction(r#"{"decision_patterns": 7}"#).is_err());
    }

    // -----------------------------------------------------------------------
    // Worker
    // -----------------------------------------------------------------------

    struct CannedExtractor(&'static str);

    #[async_trait]
    impl Capability for CannedExtractor {
        async fn respond(&self, _ctx: &TurnContext) -> Result<String, ReasoningError> {
            Ok(self.0.to_string())
        }
    }

    fn worker_with(extractor: Arc<dyn Capability>) -> (ConsolidationWorker, Arc<MetadataManager>, Arc<ConversationBuffer>) {
        let metadata = Arc::new(MetadataManager::new(Arc::new(InMemoryMetadataStore::new())));
        let buffer = Arc::new(ConversationBuffer::new());
        (
            ConsolidationWorker::new(extractor, metadata.clone(), buffer.clone()),
            metadata,
            buffer,
        )
    }

    #[tokio::test]
    async fn test_consolidate_merges_and_clears_buffer() {
        let (worker, metadata, buffer) = worker_with(Arc::new(CannedExtractor(
            r#"{"stress_triggers": ["time pressure"], "preferred_tools": ["journaling"]}"#,
        )));
        buffer.append("u1", ConversationTurn::user("deadlines crush me"));
        buffer.append("u1", ConversationTurn::capability("let's talk about it"));

        let before = metadata.get_metadata("u1").await.unwrap();
        let merged = worker.consolidate("u1").await.unwrap();

        assert!(merged.stress_triggers.contains("time pressure"));
        assert!(merged.preferred_tools.contains("journaling"));
        // New consolidation epoch.
        assert_ne!(merged.session_id, before.session_id);
        assert!(buffer.is_empty("u1"));
    }

    #[tokio::test]
    async fn test_parse_failure_leaves_metadata_and_buffer_untouched() {
        let (worker, metadata, buffer) =
            worker_with(Arc::new(CannedExtractor("no structure here at all")));
        buffer.append("u1", ConversationTurn::user("hello"));

        let before = metadata.get_metadata("u1").await.unwrap();
        let result = worker.consolidate("u1").await;
        assert!(matches!(result, Err(ConsolidationError::Parse(_))));

        let after = metadata.get_metadata("u1").await.unwrap();
        assert_eq!(before, after);
        assert!(!buffer.is_empty("u1"));
    }

    #[tokio::test]
    async fn test_empty_buffer_is_a_no_op() {
        let (worker, metadata, _buffer) = worker_with(Arc::new(CannedExtractor("{}")));

        let before = metadata.get_metadata("u1").await.unwrap();
        let after = worker.consolidate("u1").await.unwrap();
        assert_eq!(before.session_id, after.session_id);
    }

    #[tokio::test]
    async fn test_turns_arriving_during_extraction_survive() {
        struct AppendingExtractor {
            buffer: Arc<ConversationBuffer>,
        }

        #[async_trait]
        impl Capability for AppendingExtractor {
            async fn respond(&self, _ctx: &TurnContext) -> Result<String, ReasoningError> {
                // Simulates a turn landing while extraction is in flight.
                self.buffer
                    .append("u1", ConversationTurn::user("late arrival"));
                Ok(r#"{"stress_triggers": ["noise"]}"#.to_string())
            }
        }

        let metadata = Arc::new(MetadataManager::new(Arc::new(InMemoryMetadataStore::new())));
        let buffer = Arc::new(ConversationBuffer::new());
        let worker = ConsolidationWorker::new(
            Arc::new(AppendingExtractor {
                buffer: buffer.clone(),
            }),
            metadata,
            buffer.clone(),
        );

        buffer.append("u1", ConversationTurn::user("early turn"));
        worker.consolidate("u1").await.unwrap();

        let remaining = buffer.snapshot("u1");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].text, "late arrival");
    }
}
