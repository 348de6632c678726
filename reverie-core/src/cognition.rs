//! The language-model cognition collaborator and its fail-safe defaults.
//!
//! The engine never builds prompts or parses model output itself. Everything
//! that needs judgement (how poignant is this, what triple describes this,
//! which questions should I reflect on) goes through [`Cognition`]. A failure
//! there is never fatal: the wrappers in this module substitute deterministic
//! defaults and log the error.

use tracing::warn;

use crate::embedding::EmbeddingProvider;
use crate::error::{Result, ReverieError};
use crate::types::{Embedding, MemoryKind, Triple};

/// Poignancy used when the collaborator cannot score a record.
pub const DEFAULT_POIGNANCY: u8 = 4;

/// Poignancy of a mundane "is idle" observation. Never sent to the model.
pub const IDLE_POIGNANCY: u8 = 1;

/// Text of the placeholder insight written when synthesis fails.
pub const PLACEHOLDER_INSIGHT: &str = "this is blank";

/// One synthesized statement plus the indices (into the statement list it
/// was derived from) that support it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insight {
    /// The insight text.
    pub text: String,
    /// 0-based indices into the statements passed to [`Cognition::insights`].
    pub evidence: Vec<usize>,
}

impl Insight {
    /// Build an insight.
    #[must_use]
    pub fn new(text: impl Into<String>, evidence: Vec<usize>) -> Self {
        Self {
            text: text.into(),
            evidence,
        }
    }
}

/// Judgement calls delegated to a language model.
///
/// Implementations own their retry and timeout policy; an `Err` here is
/// terminal and the caller falls back to a default.
pub trait Cognition: Send + Sync {
    /// Rate how poignant `description` is for `persona`, nominally 1..=10.
    ///
    /// # Errors
    /// Any terminal model failure.
    fn poignancy(&self, persona: &str, kind: MemoryKind, description: &str) -> Result<i32>;

    /// Describe `statement` as a (subject, predicate, object) triple.
    ///
    /// # Errors
    /// Any terminal model failure.
    fn event_triple(&self, persona: &str, statement: &str) -> Result<Triple>;

    /// Generate `n` reflective questions from recent statements.
    ///
    /// # Errors
    /// Any terminal model failure.
    fn focal_points(&self, persona: &str, statements: &[String], n: usize) -> Result<Vec<String>>;

    /// Synthesize up to `n` insights, citing statement indices as evidence.
    ///
    /// # Errors
    /// Any terminal model failure.
    fn insights(&self, persona: &str, statements: &[String], n: usize) -> Result<Vec<Insight>>;

    /// A planning note drawn from a finished conversation transcript.
    ///
    /// # Errors
    /// Any terminal model failure.
    fn conversation_planning_thought(&self, persona: &str, transcript: &str) -> Result<String>;

    /// A memo about what was interesting in a conversation transcript.
    ///
    /// # Errors
    /// Any terminal model failure.
    fn conversation_memo(&self, persona: &str, transcript: &str) -> Result<String>;
}

/// A collaborator with no model behind it. Every call fails, so every
/// fail-safe applies and focal-point generation (which has none) aborts
/// reflection.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineCognition;

impl OfflineCognition {
    fn unavailable<T>() -> Result<T> {
        Err(ReverieError::Cognition("no language model configured".to_string()))
    }
}

impl Cognition for OfflineCognition {
    fn poignancy(&self, _persona: &str, _kind: MemoryKind, _description: &str) -> Result<i32> {
        Self::unavailable()
    }

    fn event_triple(&self, _persona: &str, _statement: &str) -> Result<Triple> {
        Self::unavailable()
    }

    fn focal_points(&self, _persona: &str, _statements: &[String], _n: usize) -> Result<Vec<String>> {
        Self::unavailable()
    }

    fn insights(&self, _persona: &str, _statements: &[String], _n: usize) -> Result<Vec<Insight>> {
        Self::unavailable()
    }

    fn conversation_planning_thought(&self, _persona: &str, _transcript: &str) -> Result<String> {
        Self::unavailable()
    }

    fn conversation_memo(&self, _persona: &str, _transcript: &str) -> Result<String> {
        Self::unavailable()
    }
}

/// The external services a write path needs, borrowed for one call.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    /// Judgement calls.
    pub cognition: &'a dyn Cognition,
    /// Text embeddings.
    pub embeddings: &'a dyn EmbeddingProvider,
}

impl<'a> Collaborators<'a> {
    /// Bundle the two services.
    #[must_use]
    pub fn new(cognition: &'a dyn Cognition, embeddings: &'a dyn EmbeddingProvider) -> Self {
        Self {
            cognition,
            embeddings,
        }
    }

    /// Embed `text`, or `None` (logged) if the provider fails.
    #[must_use]
    pub fn embed_or_none(&self, text: &str) -> Option<Embedding> {
        self.embeddings
            .embed(text)
            .inspect_err(|e| warn!(error = %e, "Embedding failed, record will have no vector"))
            .ok()
    }
}

// ---------------------------------------------------------------------------
// Fail-safe wrappers
// ---------------------------------------------------------------------------

/// Poignancy with fail-safes: idle descriptions score 1 without a model call,
/// model output is clamped into 1..=10, and failures score 4.
pub fn poignancy_or_default(
    cognition: &dyn Cognition,
    persona: &str,
    kind: MemoryKind,
    description: &str,
) -> u8 {
    if description.contains("is idle") {
        return IDLE_POIGNANCY;
    }
    match cognition.poignancy(persona, kind, description) {
        // Clamped into 1..=10, so the narrowing cast cannot truncate.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(score) => score.clamp(1, 10) as u8,
        Err(e) => {
            warn!(persona, %kind, error = %e, "Poignancy scoring failed, using default");
            DEFAULT_POIGNANCY
        }
    }
}

/// Event triple with the `(persona, "is", "idle")` fail-safe.
pub fn triple_or_idle(cognition: &dyn Cognition, persona: &str, statement: &str) -> Triple {
    cognition.event_triple(persona, statement).unwrap_or_else(|e| {
        warn!(persona, error = %e, "Triple extraction failed, using idle triple");
        Triple::idle(persona)
    })
}

/// Insights with a single placeholder fail-safe.
///
/// The placeholder cites statement 0. Any insight citing an index outside
/// `statements` also collapses the whole batch to the placeholder.
pub fn insights_or_placeholder(
    cognition: &dyn Cognition,
    persona: &str,
    statements: &[String],
    n: usize,
) -> Vec<Insight> {
    let placeholder = || vec![Insight::new(PLACEHOLDER_INSIGHT, vec![0])];
    match cognition.insights(persona, statements, n) {
        Ok(insights)
            if insights
                .iter()
                .all(|i| i.evidence.iter().all(|&idx| idx < statements.len())) =>
        {
            insights
        }
        Ok(_) => {
            warn!(persona, "Insight cites evidence outside the retrieved set, using placeholder");
            placeholder()
        }
        Err(e) => {
            warn!(persona, error = %e, "Insight synthesis failed, using placeholder");
            placeholder()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        poignancy: i32,
        insights: Vec<Insight>,
    }

    impl Cognition for Scripted {
        fn poignancy(&self, _: &str, _: MemoryKind, _: &str) -> Result<i32> {
            Ok(self.poignancy)
        }
        fn event_triple(&self, persona: &str, _: &str) -> Result<Triple> {
            Ok(Triple::new(persona, "plans", "party"))
        }
        fn focal_points(&self, _: &str, _: &[String], _: usize) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn insights(&self, _: &str, _: &[String], _: usize) -> Result<Vec<Insight>> {
            Ok(self.insights.clone())
        }
        fn conversation_planning_thought(&self, _: &str, _: &str) -> Result<String> {
            Ok(String::new())
        }
        fn conversation_memo(&self, _: &str, _: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn idle_descriptions_skip_the_model() {
        let cog = Scripted { poignancy: 9, insights: Vec::new() };
        assert_eq!(poignancy_or_default(&cog, "Isabella", MemoryKind::Event, "bed is idle"), 1);
        assert_eq!(poignancy_or_default(&cog, "Isabella", MemoryKind::Event, "bed is used"), 9);
    }

    #[test]
    fn model_poignancy_is_clamped() {
        let high = Scripted { poignancy: 42, insights: Vec::new() };
        let low = Scripted { poignancy: -3, insights: Vec::new() };
        assert_eq!(poignancy_or_default(&high, "A", MemoryKind::Thought, "x"), 10);
        assert_eq!(poignancy_or_default(&low, "A", MemoryKind::Thought, "x"), 1);
    }

    #[test]
    fn offline_cognition_falls_back_everywhere() {
        let cog = OfflineCognition;
        assert_eq!(
            poignancy_or_default(&cog, "Klaus", MemoryKind::Event, "Klaus is writing"),
            DEFAULT_POIGNANCY
        );
        assert_eq!(triple_or_idle(&cog, "Klaus", "anything"), Triple::idle("Klaus"));
        let statements = vec!["a".to_string()];
        assert_eq!(
            insights_or_placeholder(&cog, "Klaus", &statements, 5),
            vec![Insight::new(PLACEHOLDER_INSIGHT, vec![0])]
        );
    }

    #[test]
    fn out_of_range_evidence_collapses_to_placeholder() {
        let cog = Scripted {
            poignancy: 5,
            insights: vec![Insight::new("fine", vec![0]), Insight::new("bad", vec![3])],
        };
        let statements = vec!["a".to_string(), "b".to_string()];
        let out = insights_or_placeholder(&cog, "Klaus", &statements, 5);
        assert_eq!(out, vec![Insight::new(PLACEHOLDER_INSIGHT, vec![0])]);
    }

    #[test]
    fn valid_insights_pass_through() {
        let insights = vec![Insight::new("Klaus likes research", vec![0, 1])];
        let cog = Scripted { poignancy: 5, insights: insights.clone() };
        let statements = vec!["a".to_string(), "b".to_string()];
        assert_eq!(insights_or_placeholder(&cog, "Klaus", &statements, 5), insights);
    }
}
