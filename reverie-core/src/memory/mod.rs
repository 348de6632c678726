//! Associative memory: the per-persona experience store.
//!
//! Three append-only sequences (events, thoughts, chats) in creation order,
//! a global id index, per-kind keyword indexes with occurrence counters,
//! and an embedding cache keyed by embedding text. Nothing is ever removed;
//! the only mutation after insertion is [`MemoryStore::touch`].

pub mod record;
pub mod state;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::error::{Result, ReverieError};
use crate::types::{Embedding, MemoryId, MemoryKind, SimTime, Triple, last_path_segment};

pub use record::{MemoryRecord, NewRecord};
pub use state::{KeywordStrengthState, MemoryState, NodeState};

/// One persona's associative memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: HashMap<MemoryId, MemoryRecord>,
    seq_event: Vec<MemoryId>,
    seq_thought: Vec<MemoryId>,
    seq_chat: Vec<MemoryId>,
    kw_to_event: HashMap<String, Vec<MemoryId>>,
    kw_to_thought: HashMap<String, Vec<MemoryId>>,
    kw_strength_event: BTreeMap<String, u32>,
    kw_strength_thought: BTreeMap<String, u32>,
    embeddings: BTreeMap<String, Embedding>,
    last_id: u32,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Insertion
    // -----------------------------------------------------------------------

    /// Append an observed event.
    ///
    /// # Errors
    /// [`ReverieError::UnknownEvidence`] if `new.evidence` cites a missing id.
    pub fn add_event(&mut self, new: NewRecord) -> Result<&MemoryRecord> {
        self.insert(MemoryKind::Event, new)
    }

    /// Append a synthesized thought. Its depth is one more than the deepest
    /// record it cites.
    ///
    /// # Errors
    /// [`ReverieError::UnknownEvidence`] if `new.evidence` cites a missing id.
    pub fn add_thought(&mut self, new: NewRecord) -> Result<&MemoryRecord> {
        self.insert(MemoryKind::Thought, new)
    }

    /// Append a conversation record.
    ///
    /// # Errors
    /// [`ReverieError::UnknownEvidence`] if `new.evidence` cites a missing id.
    pub fn add_chat(&mut self, new: NewRecord) -> Result<&MemoryRecord> {
        self.insert(MemoryKind::Chat, new)
    }

    fn insert(&mut self, kind: MemoryKind, new: NewRecord) -> Result<&MemoryRecord> {
        let id = MemoryId(self.last_id + 1);
        let mut depth = 0;
        for evidence in &new.evidence {
            let cited = self
                .records
                .get(evidence)
                .ok_or(ReverieError::UnknownEvidence { record: id, evidence: *evidence })?;
            depth = depth.max(cited.depth);
        }
        if kind == MemoryKind::Thought {
            depth += 1;
        } else {
            depth = 0;
        }

        let type_count = u32::try_from(self.sequence(kind).len()).unwrap_or(u32::MAX).saturating_add(1);
        let NewRecord {
            created,
            expiration,
            triple,
            description,
            keywords,
            poignancy,
            embedding_key,
            embedding,
            evidence,
        } = new;
        let keywords: BTreeSet<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

        if let Some(vector) = embedding {
            self.embeddings.entry(embedding_key.clone()).or_insert(vector);
        }

        let record = MemoryRecord {
            id,
            kind,
            type_count,
            depth,
            created,
            expiration,
            last_accessed: created,
            subject: triple.subject,
            predicate: triple.predicate,
            object: triple.object,
            description,
            poignancy: poignancy.clamp(1, 10),
            keywords,
            embedding_key,
            evidence,
        };
        self.register(record, true);
        self.last_id = id.0;

        debug!(%id, %kind, depth, "Memory record added");
        self.records.get(&id).ok_or(ReverieError::RecordNotFound(id))
    }

    /// Place a fully-formed record into the sequences and indexes.
    /// `count_keywords` is false on restore, where strengths are loaded verbatim.
    fn register(&mut self, record: MemoryRecord, count_keywords: bool) {
        let id = record.id;
        let (index, strength) = match record.kind {
            MemoryKind::Event => (Some(&mut self.kw_to_event), Some(&mut self.kw_strength_event)),
            MemoryKind::Thought => (Some(&mut self.kw_to_thought), Some(&mut self.kw_strength_thought)),
            MemoryKind::Chat => (None, None),
        };
        if let Some(index) = index {
            for kw in &record.keywords {
                index.entry(kw.clone()).or_default().push(id);
            }
        }
        if let (Some(strength), true) = (strength, count_keywords) {
            for kw in &record.keywords {
                *strength.entry(kw.clone()).or_insert(0) += 1;
            }
        }
        match record.kind {
            MemoryKind::Event => self.seq_event.push(id),
            MemoryKind::Thought => self.seq_thought.push(id),
            MemoryKind::Chat => self.seq_chat.push(id),
        }
        self.records.insert(id, record);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Look up a record by id.
    #[must_use]
    pub fn get(&self, id: MemoryId) -> Option<&MemoryRecord> {
        self.records.get(&id)
    }

    /// Total number of records of all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether there is anything to reflect on (any event or thought).
    #[must_use]
    pub fn has_reflectable(&self) -> bool {
        !self.seq_event.is_empty() || !self.seq_thought.is_empty()
    }

    fn sequence(&self, kind: MemoryKind) -> &[MemoryId] {
        match kind {
            MemoryKind::Event => &self.seq_event,
            MemoryKind::Thought => &self.seq_thought,
            MemoryKind::Chat => &self.seq_chat,
        }
    }

    fn resolve<'a>(&'a self, ids: &'a [MemoryId]) -> impl DoubleEndedIterator<Item = &'a MemoryRecord> + 'a {
        ids.iter().filter_map(|id| self.records.get(id))
    }

    /// Events, oldest first.
    pub fn events(&self) -> impl DoubleEndedIterator<Item = &MemoryRecord> + '_ {
        self.resolve(&self.seq_event)
    }

    /// Thoughts, oldest first.
    pub fn thoughts(&self) -> impl DoubleEndedIterator<Item = &MemoryRecord> + '_ {
        self.resolve(&self.seq_thought)
    }

    /// Chats, oldest first.
    pub fn chats(&self) -> impl DoubleEndedIterator<Item = &MemoryRecord> + '_ {
        self.resolve(&self.seq_chat)
    }

    /// Number of records of one kind.
    #[must_use]
    pub fn count(&self, kind: MemoryKind) -> usize {
        self.sequence(kind).len()
    }

    /// Events whose keywords include the subject or object of the triple,
    /// most recent first.
    #[must_use]
    pub fn retrieve_relevant_events(&self, subject: &str, predicate: &str, object: &str) -> Vec<&MemoryRecord> {
        self.keyword_lookup(&self.kw_to_event, subject, predicate, object)
    }

    /// Thoughts whose keywords include the subject or object of the triple,
    /// most recent first.
    #[must_use]
    pub fn retrieve_relevant_thoughts(&self, subject: &str, predicate: &str, object: &str) -> Vec<&MemoryRecord> {
        self.keyword_lookup(&self.kw_to_thought, subject, predicate, object)
    }

    fn keyword_lookup(
        &self,
        index: &HashMap<String, Vec<MemoryId>>,
        subject: &str,
        _predicate: &str,
        object: &str,
    ) -> Vec<&MemoryRecord> {
        let ids: BTreeSet<MemoryId> = [subject, object]
            .into_iter()
            .map(|part| last_path_segment(part).to_lowercase())
            .filter_map(|kw| index.get(&kw))
            .flatten()
            .copied()
            .collect();
        ids.into_iter().rev().filter_map(|id| self.records.get(&id)).collect()
    }

    /// Triples of the `n` most recently created events, most recent first.
    #[must_use]
    pub fn get_summarized_latest_events(&self, n: usize) -> Vec<Triple> {
        self.events().rev().take(n).map(MemoryRecord::triple).collect()
    }

    /// The most recent chat with `other_name`.
    #[must_use]
    pub fn get_last_chat(&self, other_name: &str) -> Option<&MemoryRecord> {
        self.chats().rev().find(|chat| chat.object == other_name)
    }

    /// How often `keyword` has been added for `kind`. Chats are not counted.
    #[must_use]
    pub fn keyword_strength(&self, kind: MemoryKind, keyword: &str) -> u32 {
        let table = match kind {
            MemoryKind::Event => &self.kw_strength_event,
            MemoryKind::Thought => &self.kw_strength_thought,
            MemoryKind::Chat => return 0,
        };
        table.get(&keyword.to_lowercase()).copied().unwrap_or(0)
    }

    /// Ids whose expiration is at or before `now`, oldest first.
    #[must_use]
    pub fn expired(&self, now: SimTime) -> Vec<MemoryId> {
        let mut ids: Vec<MemoryId> = self
            .records
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Cached embedding for `key`.
    #[must_use]
    pub fn embedding(&self, key: &str) -> Option<&Embedding> {
        self.embeddings.get(key)
    }

    /// The whole embedding cache.
    #[must_use]
    pub fn embeddings(&self) -> &BTreeMap<String, Embedding> {
        &self.embeddings
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Mark a record as surfaced at `now`.
    ///
    /// # Errors
    /// [`ReverieError::RecordNotFound`] for an unknown id.
    pub fn touch(&mut self, id: MemoryId, now: SimTime) -> Result<()> {
        let record = self.records.get_mut(&id).ok_or(ReverieError::RecordNotFound(id))?;
        record.last_accessed = now;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Snapshot
    // -----------------------------------------------------------------------

    /// Snapshot every record, the embedding cache and keyword strengths.
    #[must_use]
    pub fn get_state(&self) -> MemoryState {
        let nodes = self
            .records
            .values()
            .map(|r| {
                let node = NodeState {
                    node_count: r.id.count(),
                    type_count: r.type_count,
                    kind: r.kind,
                    depth: r.depth,
                    created: r.created,
                    expiration: r.expiration,
                    subject: r.subject.clone(),
                    predicate: r.predicate.clone(),
                    object: r.object.clone(),
                    description: r.description.clone(),
                    embedding_key: r.embedding_key.clone(),
                    poignancy: r.poignancy,
                    keywords: r.keywords.iter().cloned().collect(),
                    filling: r.evidence.clone(),
                };
                (r.id, node)
            })
            .collect();
        MemoryState {
            nodes,
            embeddings: self.embeddings.clone(),
            kw_strength: KeywordStrengthState {
                kw_strength_event: self.kw_strength_event.clone(),
                kw_strength_thought: self.kw_strength_thought.clone(),
            },
        }
    }

    /// Rebuild a store from a snapshot.
    ///
    /// Records are restored in id order with `last_accessed = created`;
    /// keyword strengths are taken verbatim rather than recounted.
    ///
    /// # Errors
    /// [`ReverieError::UnknownEvidence`] if a record cites an id that is not
    /// an earlier node; [`ReverieError::Serialization`] if a node's key and
    /// `node_count` disagree.
    pub fn from_state(state: MemoryState) -> Result<Self> {
        let mut store = Self::new();
        for (id, node) in state.nodes {
            if id.count() != node.node_count {
                return Err(ReverieError::Serialization(format!(
                    "node key {id} does not match node_count {}",
                    node.node_count
                )));
            }
            if let Some(missing) = node.filling.iter().find(|e| !store.records.contains_key(*e)) {
                return Err(ReverieError::UnknownEvidence { record: id, evidence: *missing });
            }
            let record = MemoryRecord {
                id,
                kind: node.kind,
                type_count: node.type_count,
                depth: node.depth,
                created: node.created,
                expiration: node.expiration,
                last_accessed: node.created,
                subject: node.subject,
                predicate: node.predicate,
                object: node.object,
                description: node.description,
                poignancy: node.poignancy,
                keywords: node.keywords.iter().map(|k| k.to_lowercase()).collect(),
                embedding_key: node.embedding_key,
                evidence: node.filling,
            };
            store.register(record, false);
            store.last_id = id.count();
        }
        store.embeddings = state.embeddings;
        store.kw_strength_event = state.kw_strength.kw_strength_event;
        store.kw_strength_thought = state.kw_strength.kw_strength_thought;
        debug!(records = store.len(), "Memory store restored");
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn t0() -> SimTime {
        NaiveDate::from_ymd_opt(2023, 2, 13)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .expect("valid date")
    }

    fn event(store: &mut MemoryStore, minutes: i64, s: &str, p: &str, o: &str) -> MemoryId {
        let desc = format!("{} is {p} {}", last_path_segment(s), last_path_segment(o));
        let new = NewRecord::new(t0() + Duration::minutes(minutes), Triple::new(s, p, o), desc)
            .keywords([last_path_segment(s), last_path_segment(o)])
            .poignancy(3)
            .embedding(format!("{s} {p} {o}"), Some(Embedding(vec![1.0, 0.0])));
        store.add_event(new).expect("add event").id
    }

    #[test]
    fn ids_are_sequential_across_kinds() {
        let mut store = MemoryStore::new();
        let a = event(&mut store, 0, "Klaus", "is", "reading");
        let chat = store
            .add_chat(NewRecord::new(t0(), Triple::new("Klaus", "chat with", "Maria"), "chat"))
            .expect("chat")
            .id;
        let b = event(&mut store, 1, "Klaus", "is", "writing");
        assert_eq!((a, chat, b), (MemoryId(1), MemoryId(2), MemoryId(3)));
        assert_eq!(store.get(b).map(|r| r.type_count), Some(2));
        assert_eq!(store.count(MemoryKind::Chat), 1);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn thought_depth_follows_evidence() {
        let mut store = MemoryStore::new();
        let e = event(&mut store, 0, "Klaus", "is", "reading");
        let t1 = store
            .add_thought(NewRecord::new(t0(), Triple::new("Klaus", "likes", "books"), "likes books").evidence(vec![e]))
            .expect("thought")
            .id;
        let t2 = store
            .add_thought(NewRecord::new(t0(), Triple::new("Klaus", "is", "bookish"), "bookish").evidence(vec![e, t1]))
            .expect("thought");
        assert_eq!(t2.depth, 2);
        let bare = store
            .add_thought(NewRecord::new(t0(), Triple::new("Klaus", "is", "here"), "here"))
            .expect("thought");
        assert_eq!(bare.depth, 1);
    }

    #[test]
    fn evidence_must_exist() {
        let mut store = MemoryStore::new();
        let err = store
            .add_thought(NewRecord::new(t0(), Triple::idle("Klaus"), "x").evidence(vec![MemoryId(9)]))
            .expect_err("forward reference");
        assert!(matches!(
            err,
            ReverieError::UnknownEvidence { record: MemoryId(1), evidence: MemoryId(9) }
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn keyword_lookup_strips_paths_and_orders_newest_first() {
        let mut store = MemoryStore::new();
        let a = event(&mut store, 0, "the Ville:cafe:Klaus", "is", "reading");
        let _unrelated = event(&mut store, 1, "Maria", "is", "sleeping");
        let b = event(&mut store, 2, "Isabella", "chats with", "Klaus");

        let hits: Vec<MemoryId> = store
            .retrieve_relevant_events("the Ville:library:Klaus", "is", "idle")
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(hits, vec![b, a]);
        assert!(store.retrieve_relevant_thoughts("Klaus", "is", "idle").is_empty());
    }

    #[test]
    fn keyword_strength_counts_every_insertion() {
        let mut store = MemoryStore::new();
        event(&mut store, 0, "Klaus", "is", "reading");
        event(&mut store, 1, "KLAUS", "is", "writing");
        assert_eq!(store.keyword_strength(MemoryKind::Event, "klaus"), 2);
        assert_eq!(store.keyword_strength(MemoryKind::Event, "Reading"), 1);
        assert_eq!(store.keyword_strength(MemoryKind::Thought, "klaus"), 0);
    }

    #[test]
    fn embedding_cache_keeps_first_vector() {
        let mut store = MemoryStore::new();
        let first = NewRecord::new(t0(), Triple::idle("A"), "same").embedding("same", Some(Embedding(vec![1.0])));
        let second = NewRecord::new(t0(), Triple::idle("A"), "same").embedding("same", Some(Embedding(vec![2.0])));
        store.add_event(first).expect("add");
        store.add_event(second).expect("add");
        assert_eq!(store.embedding("same"), Some(&Embedding(vec![1.0])));
    }

    #[test]
    fn latest_events_and_last_chat() {
        let mut store = MemoryStore::new();
        event(&mut store, 0, "Klaus", "is", "reading");
        event(&mut store, 1, "Klaus", "is", "writing");
        event(&mut store, 2, "Klaus", "is", "eating");
        let latest = store.get_summarized_latest_events(2);
        assert_eq!(latest, vec![Triple::new("Klaus", "is", "eating"), Triple::new("Klaus", "is", "writing")]);

        assert!(store.get_last_chat("Maria").is_none());
        for text in ["first", "second"] {
            store
                .add_chat(NewRecord::new(t0(), Triple::new("Klaus", "chat with", "Maria"), text))
                .expect("chat");
        }
        assert_eq!(store.get_last_chat("Maria").map(|c| c.description.as_str()), Some("second"));
    }

    #[test]
    fn touch_and_expiry() {
        let mut store = MemoryStore::new();
        let e = event(&mut store, 0, "Klaus", "is", "reading");
        let later = t0() + Duration::hours(3);
        store.touch(e, later).expect("touch");
        assert_eq!(store.get(e).map(|r| r.last_accessed), Some(later));
        assert!(store.touch(MemoryId(99), later).is_err());

        let t = store
            .add_thought(NewRecord::new(t0(), Triple::idle("Klaus"), "x").expires(t0() + Duration::days(30)))
            .expect("thought")
            .id;
        assert!(store.expired(t0() + Duration::days(29)).is_empty());
        assert_eq!(store.expired(t0() + Duration::days(30)), vec![t]);
    }

    #[test]
    fn state_round_trip_is_identical() {
        let mut store = MemoryStore::new();
        let e = event(&mut store, 0, "Klaus", "is", "reading");
        store
            .add_chat(NewRecord::new(t0(), Triple::new("Klaus", "chat with", "Maria"), "talked"))
            .expect("chat");
        store
            .add_thought(
                NewRecord::new(t0(), Triple::new("Klaus", "likes", "books"), "likes books")
                    .keywords(["Klaus", "books"])
                    .expires(t0() + Duration::days(30))
                    .evidence(vec![e]),
            )
            .expect("thought");
        store.touch(e, t0() + Duration::hours(1)).expect("touch");

        let state = store.get_state();
        let restored = MemoryStore::from_state(state.clone()).expect("restore");
        assert_eq!(restored.get_state(), state);
        assert_eq!(restored.get(e).map(|r| r.last_accessed), Some(t0()));
        assert_eq!(restored.retrieve_relevant_thoughts("Klaus", "x", "y").len(), 1);

        let json = serde_json::to_value(&state).expect("json");
        assert_eq!(json["nodes"]["node_3"]["type"], "thought");
        assert_eq!(json["nodes"]["node_3"]["filling"][0], "node_1");
        assert_eq!(json["nodes"]["node_1"]["created"], "February 13, 2023, 08:00:00");
        assert!(json["nodes"]["node_1"]["expiration"].is_null());
        assert_eq!(json["kw_strength"]["kw_strength_event"]["klaus"], 1);
    }

    #[test]
    fn restore_rejects_forward_evidence() {
        let mut store = MemoryStore::new();
        let e = event(&mut store, 0, "Klaus", "is", "reading");
        let mut state = store.get_state();
        if let Some(node) = state.nodes.get_mut(&e) {
            node.filling = vec![MemoryId(5)];
        }
        assert!(matches!(
            MemoryStore::from_state(state),
            Err(ReverieError::UnknownEvidence { .. })
        ));
    }

    #[test]
    fn new_ids_continue_after_restore() {
        let mut store = MemoryStore::new();
        event(&mut store, 0, "Klaus", "is", "reading");
        event(&mut store, 1, "Klaus", "is", "writing");
        let mut restored = MemoryStore::from_state(store.get_state()).expect("restore");
        let next = event(&mut restored, 2, "Klaus", "is", "eating");
        assert_eq!(next, MemoryId(3));
    }
}
