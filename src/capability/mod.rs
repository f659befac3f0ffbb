//! Reasoning capabilities: the closed category set, the capability
//! interface, and the registry that maps each category to a handle at
//! startup.

pub mod openai;
pub mod prompts;
pub mod retrieval;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::ReasoningError;
use crate::metadata::UserMetadata;
use crate::session::ConversationTurn;

/// The closed set of capability categories. Declaration order is the
/// routing priority used to break ties:
/// crisis > decision-support > root-cause > habit-coaching >
/// stress-relief > general.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Acute crisis: the user needs immediate support.
    Crisis,
    /// The user faces a concrete choice and wants help making it.
    DecisionSupport,
    /// The user wants the root cause of their indecision or problem.
    RootCause,
    /// Long-term prevention of stress and indecision.
    HabitCoaching,
    /// Acute stress or anxiety relief.
    StressRelief,
    /// Supplemental or contextual conversation.
    General,
}

impl Category {
    /// All categories in priority order.
    pub const ALL: [Category; 6] = [
        Category::Crisis,
        Category::DecisionSupport,
        Category::RootCause,
        Category::HabitCoaching,
        Category::StressRelief,
        Category::General,
    ];

    /// Canonical label, as used in classifier replies.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Crisis => "crisis",
            Category::DecisionSupport => "decision-support",
            Category::RootCause => "root-cause",
            Category::HabitCoaching => "habit-coaching",
            Category::StressRelief => "stress-relief",
            Category::General => "general",
        }
    }

    /// Phrases accepted as naming this category in a classifier reply.
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Category::Crisis => &["crisis"],
            Category::DecisionSupport => &["decision-support", "decision support"],
            Category::RootCause => &["root-cause", "root cause", "indecision"],
            Category::HabitCoaching => &["habit-coaching", "habit coaching", "lifestyle"],
            Category::StressRelief => &["stress-relief", "stress relief"],
            Category::General => &["general"],
        }
    }

    /// Pick the category named in a classifier reply. Categories are
    /// checked in priority order, so a reply naming several resolves to
    /// the highest-priority one. Returns None for an unusable reply.
    pub fn select(reply: &str) -> Option<Category> {
        let reply = reply.to_lowercase();
        Category::ALL
            .into_iter()
            .find(|category| category.aliases().iter().any(|alias| reply.contains(alias)))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Context bundle handed to a capability for one invocation.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub metadata: UserMetadata,
    pub history: Vec<ConversationTurn>,
    pub turn: String,
}

/// A natural-language reasoning capability: given context, produce a text
/// reply. Implementations wrap an external provider; failures and timeouts
/// surface as [`ReasoningError`].
#[async_trait]
pub trait Capability: Send + Sync {
    async fn respond(&self, ctx: &TurnContext) -> Result<String, ReasoningError>;
}

/// Capability handles, one per category plus the two internal roles
/// (classifier, extractor), bound at startup.
pub struct CapabilityRegistry {
    crisis: Arc<dyn Capability>,
    decision_support: Arc<dyn Capability>,
    root_cause: Arc<dyn Capability>,
    habit_coaching: Arc<dyn Capability>,
    stress_relief: Arc<dyn Capability>,
    general: Arc<dyn Capability>,
    classifier: Arc<dyn Capability>,
    extractor: Arc<dyn Capability>,
}

impl CapabilityRegistry {
    /// Assemble a registry from explicit handles. Used by tests and by
    /// embedders that bring their own capabilities.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        crisis: Arc<dyn Capability>,
        decision_support: Arc<dyn Capability>,
        root_cause: Arc<dyn Capability>,
        habit_coaching: Arc<dyn Capability>,
        stress_relief: Arc<dyn Capability>,
        general: Arc<dyn Capability>,
        classifier: Arc<dyn Capability>,
        extractor: Arc<dyn Capability>,
    ) -> Self {
        Self {
            crisis,
            decision_support,
            root_cause,
            habit_coaching,
            stress_relief,
            general,
            classifier,
            extractor,
        }
    }

    /// Build the production registry: one OpenAI-backed capability per
    /// category, each with its role prompt, grounded in its reference
    /// corpus where one exists.
    pub fn from_settings(settings: &Settings) -> Result<Self, ReasoningError> {
        let build = |category: Category| -> Result<Arc<dyn Capability>, ReasoningError> {
            let retriever = retrieval::corpus_retriever(category);
            Ok(Arc::new(openai::OpenAiCapability::new(
                settings,
                prompts::system_prompt(category),
                retriever,
            )?))
        };

        Ok(Self {
            crisis: build(Category::Crisis)?,
            decision_support: build(Category::DecisionSupport)?,
            root_cause: build(Category::RootCause)?,
            habit_coaching: build(Category::HabitCoaching)?,
            stress_relief: build(Category::StressRelief)?,
            general: build(Category::General)?,
            classifier: Arc::new(openai::OpenAiCapability::new(
                settings,
                prompts::CLASSIFIER_PROMPT,
                None,
            )?),
            extractor: Arc::new(openai::OpenAiCapability::new(
                settings,
                prompts::EXTRACTOR_PROMPT,
                None,
            )?),
        })
    }

    /// The capability registered for a category.
    pub fn capability(&self, category: Category) -> Arc<dyn Capability> {
        match category {
            Category::Crisis => self.crisis.clone(),
            Category::DecisionSupport => self.decision_support.clone(),
            Category::RootCause => self.root_cause.clone(),
            Category::HabitCoaching => self.habit_coaching.clone(),
            Category::StressRelief => self.stress_relief.clone(),
            Category::General => self.general.clone(),
        }
    }

    pub fn classifier(&self) -> Arc<dyn Capability> {
        self.classifier.clone()
    }

    pub fn extractor(&self) -> Arc<dyn Capability> {
        self.extractor.clone()
    }
}
