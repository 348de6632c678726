//! Memory retrieval: keyword lookup for perceived events and strategy-driven
//! weighted ranking for free-text focal points.
//!
//! Weighted retrieval scores every non-idle event and thought against the
//! focal point and returns the top `n`:
//!
//!   Score = f(Recency, Relevance, Importance)   (see [`scoring`])
//!
//! Every selected record is touched (its `last_accessed` set to now), which
//! feeds back into the recency component on the next query.

pub mod scoring;

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, ReverieError};
use crate::memory::{MemoryRecord, MemoryStore};
use crate::types::{Embedding, MemoryId, SimTime};

use self::scoring::{ScoringContext, ScoringStrategy};

/// Keyword-triggered context for one perceived event.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult<'a> {
    /// The perceived event that prompted the lookup.
    pub query_event: &'a MemoryRecord,
    /// Related events, most recent first.
    pub events: Vec<&'a MemoryRecord>,
    /// Related thoughts, most recent first.
    pub thoughts: Vec<&'a MemoryRecord>,
}

/// A weighted-retrieval hit.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRecord {
    /// The record as it is after being touched.
    pub record: MemoryRecord,
    /// Strategy score.
    pub score: f64,
}

/// Ranked records for one focal point, highest score first.
#[derive(Debug, Clone, PartialEq)]
pub struct FocalRetrieval {
    /// The query text.
    pub focal_point: String,
    /// Up to `n` records.
    pub records: Vec<RankedRecord>,
}

impl FocalRetrieval {
    /// Ids of the ranked records, in rank order.
    #[must_use]
    pub fn ids(&self) -> Vec<MemoryId> {
        self.records.iter().map(|r| r.record.id).collect()
    }
}

/// The retrieval engine: a scoring strategy plus the persona's weights.
pub struct Retriever {
    strategy: Box<dyn ScoringStrategy>,
    context: ScoringContext,
}

impl Retriever {
    /// Create a retriever.
    #[must_use]
    pub fn new(strategy: Box<dyn ScoringStrategy>, context: ScoringContext) -> Self {
        Self { strategy, context }
    }

    /// Build strategy and weights from configuration.
    #[must_use]
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.build_strategy(), config.scoring_context())
    }

    /// The active scoring context.
    #[must_use]
    pub fn context(&self) -> &ScoringContext {
        &self.context
    }

    /// Name of the active strategy.
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Keyword lookup for each perceived event, keyed by its description.
    ///
    /// Read-only: `last_accessed` is not touched.
    ///
    /// # Errors
    /// [`ReverieError::RecordNotFound`] if a perceived id is not in `store`.
    pub fn retrieve<'a>(
        &self,
        perceived: &[MemoryId],
        store: &'a MemoryStore,
    ) -> Result<BTreeMap<String, RetrievalResult<'a>>> {
        let mut out = BTreeMap::new();
        for &id in perceived {
            let event = store.get(id).ok_or(ReverieError::RecordNotFound(id))?;
            let result = RetrievalResult {
                query_event: event,
                events: store.retrieve_relevant_events(&event.subject, &event.predicate, &event.object),
                thoughts: store.retrieve_relevant_thoughts(&event.subject, &event.predicate, &event.object),
            };
            debug!(
                %id,
                events = result.events.len(),
                thoughts = result.thoughts.len(),
                "Keyword retrieval"
            );
            out.insert(event.description.clone(), result);
        }
        Ok(out)
    }

    /// Weighted retrieval of up to `n` records per focal point.
    ///
    /// The candidate pool is every event and thought whose embedding key
    /// does not contain `"idle"`, ordered oldest-accessed first (creation
    /// order breaks ties). An empty pool yields an empty list without
    /// invoking the strategy. Selected records are touched at `now`.
    ///
    /// The query vector comes from the store's cache when the focal point
    /// has been embedded before, otherwise from `embedder`; if that fails,
    /// relevance is flat for this focal point.
    pub fn retrieve_by_focal_points(
        &self,
        focal_points: &[String],
        store: &mut MemoryStore,
        embedder: &dyn EmbeddingProvider,
        now: SimTime,
        n: usize,
    ) -> Vec<FocalRetrieval> {
        focal_points
            .iter()
            .map(|focal_point| self.retrieve_one(focal_point, store, embedder, now, n))
            .collect()
    }

    fn retrieve_one(
        &self,
        focal_point: &str,
        store: &mut MemoryStore,
        embedder: &dyn EmbeddingProvider,
        now: SimTime,
        n: usize,
    ) -> FocalRetrieval {
        let start = Instant::now();
        let selected: Vec<(MemoryId, f64)> = {
            let candidates = candidate_pool(store);
            if candidates.is_empty() {
                Vec::new()
            } else {
                let query = query_embedding(focal_point, store, embedder);
                let scores = self
                    .strategy
                    .compute_scores(&candidates, query.as_ref(), store.embeddings(), &self.context);
                self.strategy.select_top(&scores, n).into_iter().collect()
            }
        };

        let mut records = Vec::with_capacity(selected.len());
        for (id, score) in selected {
            if store.touch(id, now).is_ok() {
                if let Some(record) = store.get(id) {
                    records.push(RankedRecord {
                        record: record.clone(),
                        score,
                    });
                }
            }
        }

        debug!(
            strategy = self.strategy.name(),
            selected = records.len(),
            elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
            "Weighted retrieval"
        );
        FocalRetrieval {
            focal_point: focal_point.to_string(),
            records,
        }
    }
}

/// Non-idle events and thoughts, oldest-accessed first.
fn candidate_pool(store: &MemoryStore) -> Vec<&MemoryRecord> {
    let mut pool: Vec<&MemoryRecord> = store
        .events()
        .chain(store.thoughts())
        .filter(|r| !r.embedding_key.contains("idle"))
        .collect();
    pool.sort_by_key(|r| (r.last_accessed, r.id));
    pool
}

fn query_embedding(text: &str, store: &MemoryStore, embedder: &dyn EmbeddingProvider) -> Option<Embedding> {
    if let Some(cached) = store.embedding(text) {
        return Some(cached.clone());
    }
    match embedder.embed(text) {
        Ok(vector) => Some(vector),
        Err(e) => {
            warn!(focal_point = text, error = %e, "Query embedding failed, relevance disabled");
            None
        }
    }
}
