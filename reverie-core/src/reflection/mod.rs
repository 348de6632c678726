//! Reflection: synthesizing new thoughts from accumulated experience.
//!
//! A cycle runs when the configured [`ReflectionTrigger`] fires:
//!
//! 1. Recent non-idle statements seed a handful of focal-point questions.
//! 2. Each focal point drives weighted retrieval over the store.
//! 3. The retrieved records are turned into insights with cited evidence.
//! 4. Every insight becomes a thought whose evidence is the cited records.
//!
//! Independently of the trigger, a conversation that ends exactly
//! `conversation_lookahead` after the current tick yields a planning
//! thought and a memo, both citing the last chat with that partner.

pub mod trigger;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cognition::{Collaborators, insights_or_placeholder, poignancy_or_default, triple_or_idle};
use crate::config::ReflectionConfig;
use crate::error::{Result, ReverieError};
use crate::memory::{MemoryRecord, MemoryStore, NewRecord};
use crate::retrieval::Retriever;
use crate::types::{MemoryId, MemoryKind, SimTime, option_sim_time_format};

use self::trigger::{ImportanceThresholdTrigger, ReflectionContext, ReflectionTrigger, TriggerResult};

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// A persona's mutable reflection bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionCounters {
    /// Budget restored on reset.
    pub importance_trigger_max: i32,
    /// Remaining budget; each event subtracts its poignancy.
    pub importance_trigger_curr: i32,
    /// Events recorded since the last importance reset.
    pub importance_ele_n: u32,
    /// Poignancy summed over those events.
    pub importance_accumulated: u32,
    /// Events since the last event-counter reset.
    pub events_since_reflection: u32,
    /// Thoughts since the last event-counter reset.
    pub thoughts_since_reflection: u32,
    /// When reflection last ran.
    #[serde(with = "option_sim_time_format", default)]
    pub last_reflection: Option<SimTime>,
}

impl ReflectionCounters {
    /// Fresh counters with a full budget.
    #[must_use]
    pub fn new(importance_trigger_max: i32) -> Self {
        Self {
            importance_trigger_max,
            importance_trigger_curr: importance_trigger_max,
            importance_ele_n: 0,
            importance_accumulated: 0,
            events_since_reflection: 0,
            thoughts_since_reflection: 0,
            last_reflection: None,
        }
    }

    /// Account for a newly recorded event.
    pub fn record_event(&mut self, poignancy: u8) {
        self.importance_trigger_curr -= i32::from(poignancy);
        self.importance_ele_n += 1;
        self.importance_accumulated += u32::from(poignancy);
        self.events_since_reflection += 1;
    }

    /// Account for a newly synthesized thought.
    pub fn record_thought(&mut self) {
        self.thoughts_since_reflection += 1;
    }

    /// Restore the importance budget and zero its accumulators.
    pub fn reset_importance(&mut self) {
        self.importance_trigger_curr = self.importance_trigger_max;
        self.importance_ele_n = 0;
        self.importance_accumulated = 0;
    }

    /// Zero the since-reflection counts.
    pub fn reset_events(&mut self) {
        self.events_since_reflection = 0;
        self.thoughts_since_reflection = 0;
    }

    /// Immutable snapshot for trigger evaluation.
    #[must_use]
    pub fn context(&self, store: &MemoryStore, now: SimTime) -> ReflectionContext {
        ReflectionContext {
            importance_trigger_max: self.importance_trigger_max,
            importance_trigger_curr: self.importance_trigger_curr,
            importance_ele_n: self.importance_ele_n,
            importance_accumulated: self.importance_accumulated,
            now,
            last_reflection: self.last_reflection,
            total_events: store.count(MemoryKind::Event),
            total_thoughts: store.count(MemoryKind::Thought),
            events_since_reflection: self.events_since_reflection,
            thoughts_since_reflection: self.thoughts_since_reflection,
            has_memories: store.has_reflectable(),
        }
    }
}

impl Default for ReflectionCounters {
    fn default() -> Self {
        Self::new(150)
    }
}

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

/// A conversation the persona is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// The other participant, as recorded in chat objects.
    pub partner: String,
    /// Simulated time the conversation ends.
    pub end_time: SimTime,
    /// `(speaker, utterance)` lines.
    pub lines: Vec<(String, String)>,
}

impl Conversation {
    /// `speaker: utterance` lines joined with newlines.
    #[must_use]
    pub fn transcript(&self) -> String {
        self.lines
            .iter()
            .map(|(speaker, line)| format!("{speaker}: {line}\n"))
            .collect()
    }
}

/// Inputs for one reflection call.
#[derive(Debug, Clone, Copy)]
pub struct ReflectionRequest<'a> {
    /// Persona name.
    pub persona: &'a str,
    /// Current simulated time.
    pub now: SimTime,
    /// Ongoing conversation, if any.
    pub conversation: Option<&'a Conversation>,
}

/// What a reflection call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReflectionOutcome {
    /// Thoughts written, in creation order.
    pub new_thoughts: Vec<MemoryId>,
    /// Whether the importance budget was reset.
    pub should_reset_counter: bool,
    /// Whether the trigger fired.
    pub triggered: bool,
    /// Trigger explanation.
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Reflector
// ---------------------------------------------------------------------------

/// Runs reflection cycles against one persona's store.
pub struct Reflector {
    trigger: Box<dyn ReflectionTrigger>,
    focal_points: usize,
    insights_per_focal_point: usize,
    retrieval_n: usize,
    thought_ttl: Duration,
    conversation_lookahead: Duration,
}

impl Reflector {
    /// A reflector with the given trigger and default parameters.
    #[must_use]
    pub fn new(trigger: Box<dyn ReflectionTrigger>) -> Self {
        Self {
            trigger,
            focal_points: 3,
            insights_per_focal_point: 5,
            retrieval_n: 30,
            thought_ttl: Duration::days(30),
            conversation_lookahead: Duration::seconds(10),
        }
    }

    /// Build from configuration; `retrieval_n` caps records per focal point.
    #[must_use]
    pub fn from_config(config: &ReflectionConfig, retrieval_n: usize) -> Self {
        Self {
            trigger: config.trigger.build(),
            focal_points: config.focal_points,
            insights_per_focal_point: config.insights_per_focal_point,
            retrieval_n,
            thought_ttl: Duration::days(config.thought_ttl_days),
            conversation_lookahead: Duration::seconds(config.conversation_lookahead_secs),
        }
    }

    /// Evaluate the trigger, reflect if it fires, then handle a finishing
    /// conversation.
    ///
    /// Never fails: a collaborator failure either falls back to a default or,
    /// for focal points, abandons the cycle with no thoughts and no reset.
    pub fn reflect(
        &self,
        request: &ReflectionRequest<'_>,
        store: &mut MemoryStore,
        counters: &mut ReflectionCounters,
        retriever: &Retriever,
        services: Collaborators<'_>,
    ) -> ReflectionOutcome {
        let ctx = counters.context(store, request.now);
        let verdict = self.trigger.check(&ctx);
        debug!(
            persona = request.persona,
            trigger = self.trigger.name(),
            should_reflect = verdict.should_reflect,
            reason = %verdict.reason,
            "Reflection trigger evaluated"
        );

        let mut outcome = ReflectionOutcome {
            triggered: verdict.should_reflect,
            reason: verdict.reason.clone(),
            ..ReflectionOutcome::default()
        };

        if verdict.should_reflect {
            match self.run_reflect(request, store, counters, retriever, services) {
                Ok(thoughts) => {
                    self.apply_resets(&verdict, counters, request.now);
                    outcome.should_reset_counter = verdict.reset_importance_counter;
                    info!(
                        persona = request.persona,
                        thoughts = thoughts.len(),
                        reason = %verdict.reason,
                        "Reflection complete"
                    );
                    outcome.new_thoughts = thoughts;
                }
                Err(e) => {
                    warn!(persona = request.persona, error = %e, "Reflection abandoned");
                }
            }
        }

        if let Some(conversation) = request.conversation {
            if request.now + self.conversation_lookahead == conversation.end_time {
                outcome
                    .new_thoughts
                    .extend(self.reflect_on_conversation(request, conversation, store, counters, services));
            }
        }
        outcome
    }

    fn apply_resets(&self, verdict: &TriggerResult, counters: &mut ReflectionCounters, now: SimTime) {
        if verdict.reset_importance_counter {
            counters.reset_importance();
        }
        if verdict.reset_event_counter {
            counters.reset_events();
        }
        counters.last_reflection = Some(now);
    }

    fn run_reflect(
        &self,
        request: &ReflectionRequest<'_>,
        store: &mut MemoryStore,
        counters: &mut ReflectionCounters,
        retriever: &Retriever,
        services: Collaborators<'_>,
    ) -> Result<Vec<MemoryId>> {
        let statements = focal_statements(store, counters.importance_ele_n as usize);
        let focal_points = services
            .cognition
            .focal_points(request.persona, &statements, self.focal_points)?;

        let retrieved =
            retriever.retrieve_by_focal_points(&focal_points, store, services.embeddings, request.now, self.retrieval_n);

        let mut created = Vec::new();
        for hit in retrieved {
            if hit.records.is_empty() {
                continue;
            }
            let statements: Vec<String> = hit.records.iter().map(|r| r.record.embedding_key.clone()).collect();
            let ids = hit.ids();
            let insights =
                insights_or_placeholder(services.cognition, request.persona, &statements, self.insights_per_focal_point);
            for insight in insights {
                let evidence: Vec<MemoryId> = insight.evidence.iter().filter_map(|&i| ids.get(i).copied()).collect();
                match self.write_thought(request, &insight.text, evidence, store, services) {
                    Ok(id) => {
                        counters.record_thought();
                        created.push(id);
                    }
                    Err(e) => warn!(persona = request.persona, error = %e, "Dropping insight"),
                }
            }
        }
        Ok(created)
    }

    fn reflect_on_conversation(
        &self,
        request: &ReflectionRequest<'_>,
        conversation: &Conversation,
        store: &mut MemoryStore,
        counters: &mut ReflectionCounters,
        services: Collaborators<'_>,
    ) -> Vec<MemoryId> {
        let Some(last_chat) = store.get_last_chat(&conversation.partner).map(|c| c.id) else {
            warn!(
                persona = request.persona,
                partner = %conversation.partner,
                "Conversation ending but no chat recorded"
            );
            return Vec::new();
        };
        let transcript = conversation.transcript();
        let persona = request.persona;

        let texts = [
            services
                .cognition
                .conversation_planning_thought(persona, &transcript)
                .map(|t| format!("For {persona}'s planning: {t}")),
            services
                .cognition
                .conversation_memo(persona, &transcript)
                .map(|m| format!("{persona} {m}")),
        ];

        let mut created = Vec::new();
        for text in texts {
            let written = text.and_then(|text| self.write_thought(request, &text, vec![last_chat], store, services));
            match written {
                Ok(id) => {
                    counters.record_thought();
                    created.push(id);
                }
                Err(e) => warn!(persona, error = %e, "Conversation thought skipped"),
            }
        }
        created
    }

    fn write_thought(
        &self,
        request: &ReflectionRequest<'_>,
        text: &str,
        evidence: Vec<MemoryId>,
        store: &mut MemoryStore,
        services: Collaborators<'_>,
    ) -> Result<MemoryId> {
        if evidence.is_empty() {
            return Err(ReverieError::Cognition(format!("insight '{text}' cites no evidence")));
        }
        let triple = triple_or_idle(services.cognition, request.persona, text);
        let keywords = [triple.subject.clone(), triple.predicate.clone(), triple.object.clone()];
        let poignancy = poignancy_or_default(services.cognition, request.persona, MemoryKind::Thought, text);
        let embedding = store.embedding(text).cloned().or_else(|| services.embed_or_none(text));
        let record = store.add_thought(
            NewRecord::new(request.now, triple, text)
                .expires(request.now + self.thought_ttl)
                .keywords(keywords)
                .poignancy(poignancy)
                .embedding(text, embedding)
                .evidence(evidence),
        )?;
        Ok(record.id)
    }
}

impl Default for Reflector {
    fn default() -> Self {
        Self::new(Box::new(ImportanceThresholdTrigger))
    }
}

/// Embedding keys of the `ele_n` most recently accessed non-idle events and
/// thoughts, oldest first. `ele_n == 0` takes all of them.
fn focal_statements(store: &MemoryStore, ele_n: usize) -> Vec<String> {
    let mut nodes: Vec<&MemoryRecord> = store
        .events()
        .chain(store.thoughts())
        .filter(|r| !r.embedding_key.contains("idle"))
        .collect();
    nodes.sort_by_key(|r| (r.last_accessed, r.id));
    let skip = if ele_n == 0 { 0 } else { nodes.len().saturating_sub(ele_n) };
    nodes[skip..].iter().map(|r| r.embedding_key.clone()).collect()
}
