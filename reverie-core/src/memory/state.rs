//! Snapshot shape of a [`super::MemoryStore`].
//!
//! The JSON layout is fixed: `nodes` keyed by `node_<n>`, `embeddings`
//! keyed by embedding key, and the two keyword-strength tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Embedding, MemoryId, MemoryKind, SimTime, option_sim_time_format, sim_time_format};

/// Full store snapshot. Produced by `get_state`, consumed by `from_state`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    /// Every record, ascending by id.
    #[serde(default)]
    pub nodes: BTreeMap<MemoryId, NodeState>,
    /// Embedding cache.
    #[serde(default)]
    pub embeddings: BTreeMap<String, Embedding>,
    /// Keyword occurrence counters.
    #[serde(default)]
    pub kw_strength: KeywordStrengthState,
}

/// One persisted record. `last_accessed` is deliberately absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    /// Global creation count; the numeric part of the id.
    pub node_count: u32,
    /// Position within the record's kind.
    pub type_count: u32,
    /// Event, thought or chat.
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    /// Derivation depth.
    pub depth: u32,
    /// Creation time.
    #[serde(with = "sim_time_format")]
    pub created: SimTime,
    /// Expiry, `null` when none.
    #[serde(with = "option_sim_time_format", default)]
    pub expiration: Option<SimTime>,
    /// Triple subject.
    pub subject: String,
    /// Triple predicate.
    pub predicate: String,
    /// Triple object.
    pub object: String,
    /// Summary text.
    pub description: String,
    /// Embedding cache key.
    pub embedding_key: String,
    /// Importance.
    pub poignancy: u8,
    /// Index keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Evidence ids.
    #[serde(default)]
    pub filling: Vec<MemoryId>,
}

/// Per-kind keyword occurrence counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordStrengthState {
    /// Counters over event keywords.
    #[serde(default)]
    pub kw_strength_event: BTreeMap<String, u32>,
    /// Counters over thought keywords.
    #[serde(default)]
    pub kw_strength_thought: BTreeMap<String, u32>,
}
