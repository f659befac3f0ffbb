//! The capability router: one turn in, one capability invoked, one reply
//! out.
//!
//! Category selection is delegated to the classifier capability over the
//! closed category set; the router itself never answers a turn. A failed
//! capability surfaces as [`DispatchError`] with no fallback invocation
//! and no partial reply — the caller decides whether to retry.

use std::sync::Arc;

use crate::capability::{CapabilityRegistry, Category, TurnContext};
use crate::error::DispatchError;
use crate::metadata::manager::MetadataManager;
use crate::metadata::UserMetadata;
use crate::session::{ConversationBuffer, ConversationTurn};

pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    metadata: Arc<MetadataManager>,
    buffer: Arc<ConversationBuffer>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        metadata: Arc<MetadataManager>,
        buffer: Arc<ConversationBuffer>,
    ) -> Self {
        Self {
            registry,
            metadata,
            buffer,
        }
    }

    /// Route a turn: load metadata, select a category, invoke the
    /// registered capability, append both turns to the session buffer, and
    /// return the reply unmodified.
    pub async fn route(&self, user_id: &str, turn_text: &str) -> Result<String, DispatchError> {
        let metadata = self.metadata.get_metadata(user_id).await?;
        let history = self.buffer.snapshot(user_id);

        let category = self.classify(&metadata, &history, turn_text).await?;
        tracing::debug!(user_id, category = %category, "dispatching turn");

        let ctx = TurnContext {
            metadata,
            history,
            turn: turn_text.to_string(),
        };
        let reply = self
            .registry
            .capability(category)
            .respond(&ctx)
            .await
            .map_err(|source| DispatchError::Capability { category, source })?;

        self.buffer.append(user_id, ConversationTurn::user(turn_text));
        self.buffer
            .append(user_id, ConversationTurn::capability(reply.clone()));

        Ok(reply)
    }

    /// Delegated category selection. An unusable classifier reply falls
    /// back to general — some capability always answers.
    async fn classify(
        &self,
        metadata: &UserMetadata,
        history: &[ConversationTurn],
        turn_text: &str,
    ) -> Result<Category, DispatchError> {
        let ctx = TurnContext {
            metadata: metadata.clone(),
            history: history.to_vec(),
            turn: turn_text.to_string(),
        };
        let reply = self
            .registry
            .classifier()
            .respond(&ctx)
            .await
            .map_err(DispatchError::Classification)?;

        Ok(Category::select(&reply).unwrap_or_else(|| {
            tracing::debug!(reply = %reply, "unusable classifier reply, selecting general");
            Category::General
        }))
    }
}
