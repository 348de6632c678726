//! A rule-based stand-in for the language model, so the demo can reflect
//! without network access.

use reverie_core::cognition::{Cognition, Insight};
use reverie_core::types::{MemoryKind, Triple};
use reverie_core::{Result, ReverieError};

/// Words that make an observation feel significant.
const SALIENT: [&str; 6] = ["party", "research", "paper", "argument", "valentine", "deadline"];

/// Deterministic cognition driven by keyword rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedCognition;

impl Cognition for RuleBasedCognition {
    fn poignancy(&self, _persona: &str, kind: MemoryKind, description: &str) -> Result<i32> {
        let lower = description.to_lowercase();
        let hits = SALIENT.iter().filter(|w| lower.contains(*w)).count();
        let base = if kind == MemoryKind::Chat { 4 } else { 2 };
        Ok(base + 3 * i32::try_from(hits).unwrap_or(i32::MAX / 3))
    }

    fn event_triple(&self, persona: &str, statement: &str) -> Result<Triple> {
        let rest = statement.strip_prefix(persona).unwrap_or(statement).trim();
        let (predicate, object) = rest.split_once(' ').unwrap_or((rest, ""));
        if predicate.is_empty() {
            return Err(ReverieError::Cognition(format!("cannot parse '{statement}'")));
        }
        Ok(Triple::new(persona, predicate, object))
    }

    fn focal_points(&self, persona: &str, statements: &[String], n: usize) -> Result<Vec<String>> {
        if statements.is_empty() {
            return Err(ReverieError::Cognition("nothing to reflect on".into()));
        }
        Ok(statements
            .iter()
            .rev()
            .take(n)
            .map(|s| format!("Why does it matter to {persona} that {s}?"))
            .collect())
    }

    fn insights(&self, persona: &str, statements: &[String], n: usize) -> Result<Vec<Insight>> {
        Ok(statements
            .iter()
            .enumerate()
            .filter(|(_, s)| SALIENT.iter().any(|w| s.to_lowercase().contains(w)))
            .take(n)
            .map(|(i, s)| Insight::new(format!("{persona} keeps coming back to this: {s}"), vec![i]))
            .collect())
    }

    fn conversation_planning_thought(&self, _persona: &str, transcript: &str) -> Result<String> {
        let last = transcript.lines().last().unwrap_or_default();
        Ok(format!("follow up on \"{last}\""))
    }

    fn conversation_memo(&self, _persona: &str, transcript: &str) -> Result<String> {
        Ok(format!("had a conversation of {} lines", transcript.lines().count()))
    }
}
