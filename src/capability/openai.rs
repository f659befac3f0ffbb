//! OpenAI-compatible chat-completions capability.
//!
//! One instance per role: the instance owns its system prompt and, where
//! the role grounds replies in reference material, a retriever whose top
//! passages are folded into the prompt. Rate limits and server errors are
//! retried with exponential backoff; client errors are terminal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::capability::retrieval::Retriever;
use crate::capability::{Capability, TurnContext};
use crate::config::Settings;
use crate::error::ReasoningError;
use crate::session::render_transcript;

const DEFAULT_MAX_RETRIES: u32 = 2;

/// A reasoning capability backed by an OpenAI-compatible completions API.
pub struct OpenAiCapability {
    client: reqwest::Client,
    model: String,
    api_key: String,
    endpoint: String,
    system_prompt: &'static str,
    retriever: Option<Arc<dyn Retriever>>,
    max_retries: u32,
}

impl OpenAiCapability {
    pub fn new(
        settings: &Settings,
        system_prompt: &'static str,
        retriever: Option<Arc<dyn Retriever>>,
    ) -> Result<Self, ReasoningError> {
        let api_key = settings.openai_api_key.clone().ok_or_else(|| {
            ReasoningError::Configuration("OPENAI_API_KEY is not set".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| ReasoningError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            model: settings.model.clone(),
            api_key,
            endpoint: format!(
                "{}/chat/completions",
                settings.openai_base_url.trim_end_matches('/')
            ),
            system_prompt,
            retriever,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// System message: role prompt plus any retrieved reference material
    /// for this turn.
    fn system_message(&self, ctx: &TurnContext) -> String {
        let mut content = self.system_prompt.to_string();
        if let Some(ref retriever) = self.retriever {
            let passages = retriever.retrieve(&ctx.turn);
            if !passages.is_empty() {
                content.push_str("\n\nReference material:");
                for passage in passages {
                    content.push_str(&format!("\n[{}] {}", passage.source, passage.text));
                }
            }
        }
        content
    }

    /// User message: metadata, transcript so far, and the current turn,
    /// assembled the same way for every role.
    fn user_message(&self, ctx: &TurnContext) -> Result<String, ReasoningError> {
        let metadata = serde_json::to_string_pretty(&ctx.metadata)
            .map_err(|e| ReasoningError::Malformed(e.to_string()))?;
        Ok(format!(
            "User metadata:\n{metadata}\n\nConversation so far:\n{transcript}\n\nuser: {turn}",
            transcript = render_transcript(&ctx.history),
            turn = ctx.turn,
        ))
    }

    fn build_request_body(&self, ctx: &TurnContext) -> Result<Value, ReasoningError> {
        Ok(json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": self.system_message(ctx)},
                {"role": "user", "content": self.user_message(ctx)?},
            ],
        }))
    }

    fn parse_reply(response: &Value) -> Result<String, ReasoningError> {
        response
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(|text| text.to_string())
            .ok_or_else(|| {
                ReasoningError::Malformed("no completion content in response".to_string())
            })
    }
}

#[async_trait]
impl Capability for OpenAiCapability {
    async fn respond(&self, ctx: &TurnContext) -> Result<String, ReasoningError> {
        let body = self.build_request_body(ctx)?;

        let mut last_error: Option<String> = None;
        let mut retry_delay = Duration::from_secs(1);

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                log::warn!(
                    "reasoning provider retry attempt {} after {:?}",
                    attempt,
                    retry_delay
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let response = match self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) if attempt < self.max_retries => {
                    last_error = Some(e.to_string());
                    continue;
                }
                Err(e) => return Err(ReasoningError::Transport(e)),
            };

            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                last_error = Some(format!("provider returned {status}"));
                continue;
            }

            let text = response.text().await.map_err(ReasoningError::Transport)?;

            if status.is_client_error() {
                return Err(ReasoningError::Api {
                    status: status.as_u16(),
                    message: text,
                });
            }

            let parsed: Value = serde_json::from_str(&text)
                .map_err(|e| ReasoningError::Malformed(format!("{e}: {}", truncate(&text, 200))))?;
            let reply = Self::parse_reply(&parsed)?;

            log::debug!(
                "reasoning provider replied: model={}, chars={}",
                self.model,
                reply.len()
            );
            return Ok(reply);
        }

        Err(ReasoningError::Exhausted {
            attempts: self.max_retries + 1,
            message: last_error.unwrap_or_else(|| "no attempt succeeded".to_string()),
        })
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
