//! Multi-factor scoring strategies for weighted retrieval.
//!
//! Every strategy starts from the same three raw components, each min-max
//! normalized to `[0, 1]` over the candidate set:
//!
//! - **Recency**: candidates arrive ordered oldest-accessed first; the i-th
//!   (1-based) gets `decay^i`. With `decay < 1` this favours the *oldest*
//!   accessed candidate. The formula is kept exactly as is for
//!   compatibility with existing persona tuning.
//! - **Relevance**: cosine similarity of the cached record embedding to the
//!   query embedding. Missing vectors score 0.
//! - **Importance**: raw poignancy.
//!
//! Strategies differ only in how they combine the normalized components.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

use crate::memory::MemoryRecord;
use crate::types::{Embedding, MemoryId};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Per-query scoring parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringContext {
    /// Per-agent recency weight.
    pub recency_weight: f64,
    /// Per-agent relevance weight.
    pub relevance_weight: f64,
    /// Per-agent importance weight.
    pub importance_weight: f64,
    /// Per-position recency decay.
    pub recency_decay: f64,
}

impl ScoringContext {
    /// Fixed emphasis on recency before per-agent weights.
    pub const RECENCY_GLOBAL: f64 = 0.5;
    /// Fixed emphasis on relevance before per-agent weights.
    pub const RELEVANCE_GLOBAL: f64 = 3.0;
    /// Fixed emphasis on importance before per-agent weights.
    pub const IMPORTANCE_GLOBAL: f64 = 2.0;
}

impl Default for ScoringContext {
    fn default() -> Self {
        Self {
            recency_weight: 1.0,
            relevance_weight: 1.0,
            importance_weight: 1.0,
            recency_decay: 0.99,
        }
    }
}

// ---------------------------------------------------------------------------
// Score map
// ---------------------------------------------------------------------------

/// Scores keyed by record id, kept in candidate order.
///
/// Iteration order is meaningful: [`ScoringStrategy::select_top`] breaks
/// ties in favour of the entry that comes first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreMap {
    entries: Vec<(MemoryId, f64)>,
}

impl ScoreMap {
    /// Score of `id`, if present.
    #[must_use]
    pub fn get(&self, id: MemoryId) -> Option<f64> {
        self.entries.iter().find(|(k, _)| *k == id).map(|(_, v)| *v)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (MemoryId, f64)> + '_ {
        self.entries.iter().copied()
    }

    /// Ids in order.
    pub fn ids(&self) -> impl Iterator<Item = MemoryId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Scores in order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(_, v)| *v)
    }

    fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        self.entries
            .iter()
            .zip(&other.entries)
            .map(|(&(id, a), &(_, b))| (id, f(a, b)))
            .collect()
    }
}

impl FromIterator<(MemoryId, f64)> for ScoreMap {
    fn from_iter<I: IntoIterator<Item = (MemoryId, f64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ScoreMap {
    type Item = (MemoryId, f64);
    type IntoIter = std::vec::IntoIter<(MemoryId, f64)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Min-max normalize into `[target_min, target_max]`.
///
/// When every value is equal the whole map collapses to the midpoint of
/// the target range.
#[must_use]
pub fn normalize(scores: &ScoreMap, target_min: f64, target_max: f64) -> ScoreMap {
    let Some(min) = scores.values().map(OrderedFloat).min() else {
        return ScoreMap::default();
    };
    let max = scores.values().map(OrderedFloat).max().unwrap_or(min);
    let (min, max) = (min.0, max.0);
    let range = max - min;
    if range == 0.0 {
        let mid = (target_min + target_max) / 2.0;
        return scores.ids().map(|id| (id, mid)).collect();
    }
    scores
        .iter()
        .map(|(id, v)| (id, (v - min) * (target_max - target_min) / range + target_min))
        .collect()
}

/// Raw recency: `decay^i` for the i-th candidate (1-based).
#[must_use]
pub fn recency_scores(candidates: &[&MemoryRecord], decay: f64) -> ScoreMap {
    let mut value = 1.0;
    candidates
        .iter()
        .map(|r| {
            value *= decay;
            (r.id, value)
        })
        .collect()
}

/// Raw importance: poignancy.
#[must_use]
pub fn importance_scores(candidates: &[&MemoryRecord]) -> ScoreMap {
    candidates.iter().map(|r| (r.id, f64::from(r.poignancy))).collect()
}

/// Raw relevance: cosine similarity to `query`, 0 without a query or a
/// cached vector.
#[must_use]
pub fn relevance_scores(
    candidates: &[&MemoryRecord],
    query: Option<&Embedding>,
    embeddings: &BTreeMap<String, Embedding>,
) -> ScoreMap {
    candidates
        .iter()
        .map(|r| {
            let sim = match (query, embeddings.get(&r.embedding_key)) {
                (Some(q), Some(v)) => f64::from(v.cosine_similarity(q)),
                _ => 0.0,
            };
            (r.id, sim)
        })
        .collect()
}

/// The three normalized components over one candidate set.
#[derive(Debug, Clone, PartialEq)]
pub struct Components {
    /// Normalized recency.
    pub recency: ScoreMap,
    /// Normalized relevance.
    pub relevance: ScoreMap,
    /// Normalized importance.
    pub importance: ScoreMap,
}

impl Components {
    /// Compute and normalize all three components.
    #[must_use]
    pub fn compute(
        candidates: &[&MemoryRecord],
        query: Option<&Embedding>,
        embeddings: &BTreeMap<String, Embedding>,
        ctx: &ScoringContext,
    ) -> Self {
        Self {
            recency: normalize(&recency_scores(candidates, ctx.recency_decay), 0.0, 1.0),
            relevance: normalize(&relevance_scores(candidates, query, embeddings), 0.0, 1.0),
            importance: normalize(&importance_scores(candidates), 0.0, 1.0),
        }
    }

    fn rows(&self) -> impl Iterator<Item = (MemoryId, f64, f64, f64)> + '_ {
        self.recency
            .iter()
            .zip(self.relevance.values())
            .zip(self.importance.values())
            .map(|(((id, r), v), i)| (id, r, v, i))
    }
}

// ---------------------------------------------------------------------------
// Strategy trait
// ---------------------------------------------------------------------------

/// A ranking function over a candidate set.
///
/// `candidates` must already be ordered oldest-accessed first; the returned
/// map keeps that order.
pub trait ScoringStrategy: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    /// Score every candidate.
    fn compute_scores(
        &self,
        candidates: &[&MemoryRecord],
        query: Option<&Embedding>,
        embeddings: &BTreeMap<String, Embedding>,
        ctx: &ScoringContext,
    ) -> ScoreMap;

    /// The `n` highest scores, descending. Ties keep candidate order.
    fn select_top(&self, scores: &ScoreMap, n: usize) -> ScoreMap {
        let mut entries: Vec<(MemoryId, f64)> = scores.iter().collect();
        entries.sort_by_key(|&(_, score)| Reverse(OrderedFloat(score)));
        entries.truncate(n);
        entries.into_iter().collect()
    }
}

/// `w_r·R·0.5 + w_v·V·3 + w_i·I·2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearWeightedScoring;

impl ScoringStrategy for LinearWeightedScoring {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn compute_scores(
        &self,
        candidates: &[&MemoryRecord],
        query: Option<&Embedding>,
        embeddings: &BTreeMap<String, Embedding>,
        ctx: &ScoringContext,
    ) -> ScoreMap {
        Components::compute(candidates, query, embeddings, ctx)
            .rows()
            .map(|(id, r, v, i)| {
                let score = ctx.recency_weight * r * ScoringContext::RECENCY_GLOBAL
                    + ctx.relevance_weight * v * ScoringContext::RELEVANCE_GLOBAL
                    + ctx.importance_weight * i * ScoringContext::IMPORTANCE_GLOBAL;
                (id, score)
            })
            .collect()
    }
}

/// Softmax over the per-agent weighted terms decides how much each raw
/// component contributes. Global multipliers are not applied.
#[derive(Debug, Clone, Copy)]
pub struct AttentionBasedScoring {
    temperature: f64,
}

impl AttentionBasedScoring {
    /// Lower temperature sharpens attention. Non-positive values fall back to 1.
    #[must_use]
    pub fn new(temperature: f64) -> Self {
        let temperature = if temperature > 0.0 { temperature } else { 1.0 };
        Self { temperature }
    }
}

impl Default for AttentionBasedScoring {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ScoringStrategy for AttentionBasedScoring {
    fn name(&self) -> &'static str {
        "attention"
    }

    fn compute_scores(
        &self,
        candidates: &[&MemoryRecord],
        query: Option<&Embedding>,
        embeddings: &BTreeMap<String, Embedding>,
        ctx: &ScoringContext,
    ) -> ScoreMap {
        Components::compute(candidates, query, embeddings, ctx)
            .rows()
            .map(|(id, r, v, i)| {
                let logits = [
                    ctx.recency_weight * r / self.temperature,
                    ctx.relevance_weight * v / self.temperature,
                    ctx.importance_weight * i / self.temperature,
                ];
                let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let exp = logits.map(|l| (l - max).exp());
                let sum: f64 = exp.iter().sum();
                let score = (exp[0] * r + exp[1] * v + exp[2] * i) / sum;
                (id, score)
            })
            .collect()
    }
}

/// Normalized recency alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecencyOnlyScoring;

impl ScoringStrategy for RecencyOnlyScoring {
    fn name(&self) -> &'static str {
        "recency_only"
    }

    fn compute_scores(
        &self,
        candidates: &[&MemoryRecord],
        _query: Option<&Embedding>,
        _embeddings: &BTreeMap<String, Embedding>,
        ctx: &ScoringContext,
    ) -> ScoreMap {
        normalize(&recency_scores(candidates, ctx.recency_decay), 0.0, 1.0)
    }
}

/// Normalized relevance alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelevanceOnlyScoring;

impl ScoringStrategy for RelevanceOnlyScoring {
    fn name(&self) -> &'static str {
        "relevance_only"
    }

    fn compute_scores(
        &self,
        candidates: &[&MemoryRecord],
        query: Option<&Embedding>,
        embeddings: &BTreeMap<String, Embedding>,
        _ctx: &ScoringContext,
    ) -> ScoreMap {
        normalize(&relevance_scores(candidates, query, embeddings), 0.0, 1.0)
    }
}

/// Normalized importance alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportanceOnlyScoring;

impl ScoringStrategy for ImportanceOnlyScoring {
    fn name(&self) -> &'static str {
        "importance_only"
    }

    fn compute_scores(
        &self,
        candidates: &[&MemoryRecord],
        _query: Option<&Embedding>,
        _embeddings: &BTreeMap<String, Embedding>,
        _ctx: &ScoringContext,
    ) -> ScoreMap {
        normalize(&importance_scores(candidates), 0.0, 1.0)
    }
}

/// `recency × relevance`: both must be high.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridRelevanceRecencyScoring;

impl ScoringStrategy for HybridRelevanceRecencyScoring {
    fn name(&self) -> &'static str {
        "hybrid_relevance_recency"
    }

    fn compute_scores(
        &self,
        candidates: &[&MemoryRecord],
        query: Option<&Embedding>,
        embeddings: &BTreeMap<String, Embedding>,
        ctx: &ScoringContext,
    ) -> ScoreMap {
        let recency = normalize(&recency_scores(candidates, ctx.recency_decay), 0.0, 1.0);
        let relevance = normalize(&relevance_scores(candidates, query, embeddings), 0.0, 1.0);
        recency.zip_with(&relevance, |r, v| r * v)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, NewRecord};
    use crate::types::{SimTime, Triple};
    use chrono::NaiveDate;

    fn t0() -> SimTime {
        NaiveDate::from_ymd_opt(2023, 2, 13)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .expect("valid date")
    }

    /// Store with one event per `(poignancy, embedding)` pair, in order.
    fn store_with(specs: &[(u8, Vec<f32>)]) -> MemoryStore {
        let mut store = MemoryStore::new();
        for (n, (poignancy, vector)) in specs.iter().enumerate() {
            let text = format!("event {n}");
            store
                .add_event(
                    NewRecord::new(t0(), Triple::new("A", "is", text.clone()), text.clone())
                        .poignancy(*poignancy)
                        .embedding(text, Some(Embedding(vector.clone()))),
                )
                .expect("add");
        }
        store
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn normalize_spans_unit_range() {
        let scores: ScoreMap = [(MemoryId(1), 2.0), (MemoryId(2), 4.0), (MemoryId(3), 3.0)].into_iter().collect();
        let out = normalize(&scores, 0.0, 1.0);
        assert_eq!(out.get(MemoryId(1)), Some(0.0));
        assert_eq!(out.get(MemoryId(2)), Some(1.0));
        assert_eq!(out.get(MemoryId(3)), Some(0.5));
    }

    #[test]
    fn normalize_equal_values_yield_midpoint() {
        let scores: ScoreMap = [(MemoryId(1), 7.0), (MemoryId(2), 7.0)].into_iter().collect();
        let out = normalize(&scores, 0.0, 1.0);
        assert!(out.values().all(|v| close(v, 0.5)));
        assert!(normalize(&ScoreMap::default(), 0.0, 1.0).is_empty());
    }

    #[test]
    fn recency_favours_oldest_accessed() {
        let store = store_with(&[(5, vec![1.0, 0.0]), (5, vec![1.0, 0.0])]);
        let candidates: Vec<&MemoryRecord> = store.events().collect();
        let raw = recency_scores(&candidates, 0.99);
        assert!(close(raw.get(MemoryId(1)).unwrap_or_default(), 0.99));
        assert!(close(raw.get(MemoryId(2)).unwrap_or_default(), 0.99 * 0.99));
    }

    #[test]
    fn linear_scoring_differs_only_in_recency() {
        let store = store_with(&[(5, vec![1.0, 0.0]), (5, vec![1.0, 0.0])]);
        let candidates: Vec<&MemoryRecord> = store.events().collect();
        let query = Embedding(vec![1.0, 0.0]);
        let ctx = ScoringContext::default();

        let parts = Components::compute(&candidates, Some(&query), store.embeddings(), &ctx);
        assert_eq!(parts.relevance.get(MemoryId(1)), parts.relevance.get(MemoryId(2)));
        assert_eq!(parts.importance.get(MemoryId(1)), parts.importance.get(MemoryId(2)));
        assert_ne!(parts.recency.get(MemoryId(1)), parts.recency.get(MemoryId(2)));

        let scores = LinearWeightedScoring.compute_scores(&candidates, Some(&query), store.embeddings(), &ctx);
        // Oldest: recency 1 → 0.5 + 3·0.5 + 2·0.5. Newest: recency 0.
        assert!(close(scores.get(MemoryId(1)).unwrap_or_default(), 3.0));
        assert!(close(scores.get(MemoryId(2)).unwrap_or_default(), 2.5));
    }

    #[test]
    fn missing_query_collapses_relevance() {
        let store = store_with(&[(1, vec![1.0, 0.0]), (9, vec![0.0, 1.0])]);
        let candidates: Vec<&MemoryRecord> = store.events().collect();
        let scores = RelevanceOnlyScoring.compute_scores(&candidates, None, store.embeddings(), &ScoringContext::default());
        assert!(scores.values().all(|v| close(v, 0.5)));
    }

    #[test]
    fn single_component_strategies() {
        let store = store_with(&[(1, vec![0.0, 1.0]), (9, vec![1.0, 0.0])]);
        let candidates: Vec<&MemoryRecord> = store.events().collect();
        let query = Embedding(vec![1.0, 0.0]);
        let ctx = ScoringContext::default();
        let emb = store.embeddings();

        let imp = ImportanceOnlyScoring.compute_scores(&candidates, Some(&query), emb, &ctx);
        assert_eq!((imp.get(MemoryId(1)), imp.get(MemoryId(2))), (Some(0.0), Some(1.0)));

        let rel = RelevanceOnlyScoring.compute_scores(&candidates, Some(&query), emb, &ctx);
        assert_eq!((rel.get(MemoryId(1)), rel.get(MemoryId(2))), (Some(0.0), Some(1.0)));

        let rec = RecencyOnlyScoring.compute_scores(&candidates, Some(&query), emb, &ctx);
        assert_eq!((rec.get(MemoryId(1)), rec.get(MemoryId(2))), (Some(1.0), Some(0.0)));

        // Oldest is least relevant, newest is least recent: product is 0 for both.
        let hybrid = HybridRelevanceRecencyScoring.compute_scores(&candidates, Some(&query), emb, &ctx);
        assert!(hybrid.values().all(|v| close(v, 0.0)));
    }

    #[test]
    fn attention_scores_stay_in_unit_range() {
        let store = store_with(&[(1, vec![0.0, 1.0]), (5, vec![1.0, 1.0]), (9, vec![1.0, 0.0])]);
        let candidates: Vec<&MemoryRecord> = store.events().collect();
        let query = Embedding(vec![1.0, 0.0]);
        let scores = AttentionBasedScoring::new(0.5).compute_scores(
            &candidates,
            Some(&query),
            store.embeddings(),
            &ScoringContext::default(),
        );
        assert_eq!(scores.len(), 3);
        assert!(scores.values().all(|v| (0.0..=1.0).contains(&v)));
        // Newest: relevance 1, importance 1, recency 0. Attention leans on the
        // two high terms, so the score is close to 1.
        assert!(scores.get(MemoryId(3)).unwrap_or_default() > 0.8);
    }

    #[test]
    fn attention_matches_softmax_over_components() {
        let store = store_with(&[(1, vec![0.0, 1.0]), (9, vec![1.0, 0.0])]);
        let candidates: Vec<&MemoryRecord> = store.events().collect();
        let query = Embedding(vec![1.0, 0.0]);
        let scores = AttentionBasedScoring::new(1.0).compute_scores(
            &candidates,
            Some(&query),
            store.embeddings(),
            &ScoringContext::default(),
        );
        let e = std::f64::consts::E;
        // Oldest: (recency, relevance, importance) = (1, 0, 0), logits [1, 0, 0].
        assert!(close(scores.get(MemoryId(1)).unwrap_or_default(), e / (e + 2.0)));
        // Newest: (0, 1, 1), logits [0, 1, 1].
        assert!(close(scores.get(MemoryId(2)).unwrap_or_default(), 2.0 * e / (1.0 + 2.0 * e)));

        // Halving the temperature sharpens attention on the oldest record's lone term.
        let sharp = AttentionBasedScoring::new(0.5).compute_scores(
            &candidates,
            Some(&query),
            store.embeddings(),
            &ScoringContext::default(),
        );
        let e2 = e * e;
        assert!(close(sharp.get(MemoryId(1)).unwrap_or_default(), e2 / (e2 + 2.0)));
    }

    #[test]
    fn select_top_is_descending_and_stable() {
        let scores: ScoreMap = [
            (MemoryId(1), 0.5),
            (MemoryId(2), 0.9),
            (MemoryId(3), 0.5),
            (MemoryId(4), 0.1),
        ]
        .into_iter()
        .collect();
        let top = LinearWeightedScoring.select_top(&scores, 3);
        assert_eq!(top.ids().collect::<Vec<_>>(), vec![MemoryId(2), MemoryId(1), MemoryId(3)]);
        assert_eq!(LinearWeightedScoring.select_top(&scores, 0).len(), 0);
        assert_eq!(LinearWeightedScoring.select_top(&scores, 10).len(), 4);
    }
}
