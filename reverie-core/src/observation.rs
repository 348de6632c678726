//! Observation write path: perceived world events become event records.
//!
//! Each tick the simulation hands over what the persona can see as raw
//! `(subject, predicate?, object?, description?)` tuples. Those already
//! recorded among the latest `retention` events are dropped; the rest are
//! scored, embedded and appended, and each one draws down the persona's
//! importance budget.

use tracing::debug;

use crate::cognition::{Collaborators, poignancy_or_default};
use crate::error::Result;
use crate::memory::{MemoryStore, NewRecord};
use crate::reflection::ReflectionCounters;
use crate::types::{Embedding, MemoryId, MemoryKind, SimTime, Triple, last_path_segment};

/// A raw event as perceived in the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerceivedEvent {
    /// Actor or object, possibly a `world:sector:arena:object` path.
    pub subject: String,
    /// `None` means the subject is doing nothing.
    pub predicate: Option<String>,
    /// Target of the action.
    pub object: Option<String>,
    /// Short activity text, e.g. `"reading a book"`.
    pub description: Option<String>,
}

impl PerceivedEvent {
    /// An active event.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: Some(predicate.into()),
            object: Some(object.into()),
            description: Some(description.into()),
        }
    }

    /// A subject with nothing going on.
    #[must_use]
    pub fn idle(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            predicate: None,
            object: None,
            description: None,
        }
    }

    /// Resolve the stored triple and description.
    fn resolve(&self) -> (Triple, String) {
        let (triple, activity) = match &self.predicate {
            Some(predicate) => (
                Triple::new(
                    &self.subject,
                    predicate,
                    self.object.clone().unwrap_or_default(),
                ),
                self.description.clone().unwrap_or_default(),
            ),
            None => (Triple::new(&self.subject, "is", "idle"), "idle".to_string()),
        };
        let description = format!("{} is {activity}", last_path_segment(&self.subject));
        (triple, description)
    }
}

/// The persona's own ongoing conversation, recorded as a chat when it
/// perceives itself chatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatContext {
    /// The persona's current action triple.
    pub triple: Triple,
    /// The persona's current action description.
    pub description: String,
}

/// Who is perceiving, and when.
#[derive(Debug, Clone, Copy)]
pub struct Perception<'a> {
    /// Persona name, as used in event subjects.
    pub persona: &'a str,
    /// Current simulated time.
    pub now: SimTime,
    /// Dedup window over the latest events.
    pub retention: usize,
    /// Ongoing conversation, if any.
    pub chat: Option<&'a ChatContext>,
}

/// The text whose embedding represents an event: the first parenthesised
/// span of `description` when there is one, else the whole description.
#[must_use]
pub fn embedding_key_for(description: &str) -> String {
    match description.split_once('(') {
        Some((_, rest)) => rest.split(')').next().unwrap_or(rest).trim().to_string(),
        None => description.to_string(),
    }
}

fn cached_or_embed(store: &MemoryStore, services: &Collaborators<'_>, key: &str) -> Option<Embedding> {
    store
        .embedding(key)
        .cloned()
        .or_else(|| services.embed_or_none(key))
}

/// Record perceived events, returning the ids of the events created.
///
/// # Errors
/// Only store insertion errors, which cannot occur for evidence-free events.
pub fn observe(
    perception: &Perception<'_>,
    perceived: &[PerceivedEvent],
    store: &mut MemoryStore,
    counters: &mut ReflectionCounters,
    services: Collaborators<'_>,
) -> Result<Vec<MemoryId>> {
    let mut created = Vec::new();
    for event in perceived {
        let (triple, description) = event.resolve();
        if store
            .get_summarized_latest_events(perception.retention)
            .contains(&triple)
        {
            debug!(persona = perception.persona, %triple, "Already perceived, skipping");
            continue;
        }

        let keywords = [
            last_path_segment(&triple.subject).to_string(),
            last_path_segment(&triple.object).to_string(),
        ];
        let key = embedding_key_for(&description);
        let embedding = cached_or_embed(store, &services, &key);
        let poignancy =
            poignancy_or_default(services.cognition, perception.persona, MemoryKind::Event, &key);

        if let Some(chat) = perception.chat {
            if triple.subject == perception.persona && triple.predicate == "chat with" {
                let chat_embedding = cached_or_embed(store, &services, &chat.description);
                let chat_poignancy = poignancy_or_default(
                    services.cognition,
                    perception.persona,
                    MemoryKind::Chat,
                    &chat.description,
                );
                store.add_chat(
                    NewRecord::new(perception.now, chat.triple.clone(), chat.description.clone())
                        .keywords(keywords.clone())
                        .poignancy(chat_poignancy)
                        .embedding(chat.description.clone(), chat_embedding),
                )?;
            }
        }

        let id = store
            .add_event(
                NewRecord::new(perception.now, triple, description)
                    .keywords(keywords)
                    .poignancy(poignancy)
                    .embedding(key, embedding),
            )?
            .id;
        counters.record_event(poignancy);
        created.push(id);
    }
    debug!(
        persona = perception.persona,
        perceived = perceived.len(),
        recorded = created.len(),
        "Perception recorded"
    );
    Ok(created)
}
