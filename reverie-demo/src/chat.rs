//! Cognition backed by a chat model, for runs with a configured provider.
//!
//! Poignancy and the two conversation notes go to the model. Triples,
//! focal points and insights stay with the rule-based cognition.

use reverie_core::cognition::{Cognition, Insight};
use reverie_core::config::LlmConfig;
use reverie_core::types::{MemoryKind, Triple};
use reverie_core::{Result, ReverieError};
use reverie_llm::{ChatMessage, ChatRequest, LlmBackend, LlmClient, LlmError, LlmService};
use tokio::runtime::{Builder, Runtime};

use crate::heuristic::RuleBasedCognition;

/// Blocks on an [`LlmService`] for each judgement it answers itself.
pub struct ChatCognition<B = LlmClient> {
    runtime: Runtime,
    service: LlmService<B>,
    model: String,
    fallback: RuleBasedCognition,
}

impl<B: LlmBackend> ChatCognition<B> {
    /// Wrap a service that answers with `model`.
    ///
    /// # Errors
    /// [`LlmError::ConfigError`] if the runtime cannot start.
    pub fn new(service: LlmService<B>, model: impl Into<String>) -> std::result::Result<Self, LlmError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| LlmError::ConfigError(format!("cannot start chat runtime: {e}")))?;
        Ok(Self {
            runtime,
            service,
            model: model.into(),
            fallback: RuleBasedCognition,
        })
    }

    fn ask(&self, system: &str, user: String) -> Result<String> {
        let request = ChatRequest::new(&self.model, vec![ChatMessage::system(system), ChatMessage::user(user)])
            .with_temperature(0.0)
            .with_max_tokens(64);
        let text = self.runtime.block_on(self.service.chat(&request))?;
        Ok(text.trim().to_string())
    }
}

impl ChatCognition<LlmClient> {
    /// Build from configuration, answering with `completion_model`.
    ///
    /// # Errors
    /// Client construction failures or a runtime that cannot start.
    pub fn from_config(config: &LlmConfig, service: LlmService<LlmClient>) -> std::result::Result<Self, LlmError> {
        Self::new(service, config.completion_model.clone())
    }
}

/// First integer in `reply`.
fn first_integer(reply: &str) -> Option<i32> {
    reply
        .split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

impl<B: LlmBackend> Cognition for ChatCognition<B> {
    fn poignancy(&self, persona: &str, kind: MemoryKind, description: &str) -> Result<i32> {
        let reply = self.ask(
            "Rate memories on a scale of 1 (mundane) to 10 (extremely poignant). Answer with the number only.",
            format!("{persona} recorded this {kind}: {description}"),
        )?;
        first_integer(&reply).ok_or_else(|| ReverieError::Cognition(format!("no rating in '{reply}'")))
    }

    fn event_triple(&self, persona: &str, statement: &str) -> Result<Triple> {
        self.fallback.event_triple(persona, statement)
    }

    fn focal_points(&self, persona: &str, statements: &[String], n: usize) -> Result<Vec<String>> {
        self.fallback.focal_points(persona, statements, n)
    }

    fn insights(&self, persona: &str, statements: &[String], n: usize) -> Result<Vec<Insight>> {
        self.fallback.insights(persona, statements, n)
    }

    fn conversation_planning_thought(&self, persona: &str, transcript: &str) -> Result<String> {
        self.ask(
            "Write one sentence, in the third person, about what the speaker should remember for their planning.",
            format!("{persona} just had this conversation:\n{transcript}"),
        )
    }

    fn conversation_memo(&self, persona: &str, transcript: &str) -> Result<String> {
        self.ask(
            "Write one sentence, in the third person, about what the speaker found interesting.",
            format!("{persona} just had this conversation:\n{transcript}"),
        )
    }
}
