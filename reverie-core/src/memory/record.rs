//! The unit of experience and its insertion descriptor.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{Embedding, MemoryId, MemoryKind, SimTime, Triple};

/// A single stored experience: an observed event, a synthesized thought,
/// or a conversation.
///
/// Everything except `last_accessed` is fixed at creation. The store only
/// hands out shared references, so the one permitted mutation goes through
/// [`crate::MemoryStore::touch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Stable unique id.
    pub id: MemoryId,
    /// Event, thought or chat.
    pub kind: MemoryKind,
    /// 1-based position within this kind's sequence.
    pub type_count: u32,
    /// Derivation hops from raw observation (0 for events and chats).
    pub depth: u32,
    /// Simulated creation time.
    pub created: SimTime,
    /// Simulated time after which a forgetting policy may drop the record.
    pub expiration: Option<SimTime>,
    /// Simulated time the record was last surfaced by weighted retrieval.
    pub last_accessed: SimTime,
    /// Triple subject.
    pub subject: String,
    /// Triple predicate.
    pub predicate: String,
    /// Triple object.
    pub object: String,
    /// Human-readable summary.
    pub description: String,
    /// Importance in 1..=10.
    pub poignancy: u8,
    /// Lower-cased index keywords.
    pub keywords: BTreeSet<String>,
    /// Key into the store's embedding cache.
    pub embedding_key: String,
    /// Ids of the records this one was derived from.
    pub evidence: Vec<MemoryId>,
}

impl MemoryRecord {
    /// The record's `(subject, predicate, object)`.
    #[must_use]
    pub fn triple(&self) -> Triple {
        Triple::new(&self.subject, &self.predicate, &self.object)
    }

    /// Whether a forgetting policy may drop this record at `now`.
    #[must_use]
    pub fn is_expired(&self, now: SimTime) -> bool {
        self.expiration.is_some_and(|exp| exp <= now)
    }
}

/// Everything needed to append a record; the store fills in id, kind,
/// position, depth and `last_accessed`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    /// Simulated creation time.
    pub created: SimTime,
    /// Optional expiry.
    pub expiration: Option<SimTime>,
    /// Semantic triple.
    pub triple: Triple,
    /// Human-readable summary.
    pub description: String,
    /// Keywords, lower-cased on insertion.
    pub keywords: Vec<String>,
    /// Importance in 1..=10; clamped on insertion.
    pub poignancy: u8,
    /// Cache key for the embedding. Defaults to the description.
    pub embedding_key: String,
    /// Freshly computed vector for `embedding_key`, if any.
    pub embedding: Option<Embedding>,
    /// Ids this record is derived from. Must already exist in the store.
    pub evidence: Vec<MemoryId>,
}

impl NewRecord {
    /// Start a record with no keywords, evidence or embedding and the
    /// description as its embedding key.
    #[must_use]
    pub fn new(created: SimTime, triple: Triple, description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            created,
            expiration: None,
            triple,
            embedding_key: description.clone(),
            description,
            keywords: Vec::new(),
            poignancy: 1,
            embedding: None,
            evidence: Vec::new(),
        }
    }

    /// Set the expiry.
    #[must_use]
    pub fn expires(mut self, at: SimTime) -> Self {
        self.expiration = Some(at);
        self
    }

    /// Set the index keywords.
    #[must_use]
    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Set the poignancy.
    #[must_use]
    pub fn poignancy(mut self, poignancy: u8) -> Self {
        self.poignancy = poignancy;
        self
    }

    /// Set the embedding key and, if one was computed, its vector.
    #[must_use]
    pub fn embedding(mut self, key: impl Into<String>, vector: Option<Embedding>) -> Self {
        self.embedding_key = key.into();
        self.embedding = vector;
        self
    }

    /// Set the evidence list.
    #[must_use]
    pub fn evidence(mut self, evidence: Vec<MemoryId>) -> Self {
        self.evidence = evidence;
        self
    }
}
