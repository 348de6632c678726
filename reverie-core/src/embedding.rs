//! Vector embedding abstraction layer.
//!
//! The retriever asks an [`EmbeddingProvider`] for the vector of each focal
//! point; the store caches record vectors under their embedding key so the
//! provider is only hit for text it has not seen before.
//!
//! The production provider lives in `reverie-llm` (remote embedding API).
//! The providers here cover tests, benchmarks and offline runs.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::Result;
use crate::types::Embedding;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Generate vector embeddings from text.
///
/// Implementations may block (remote calls) and may fail; callers in this
/// crate treat a failure as "no similarity signal" rather than an error.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReverieError::Embedding`] if the model fails to
    /// produce an embedding.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// The dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A human-readable name for the model.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Stub / zero-vector provider
// ---------------------------------------------------------------------------

/// Returns zero-vectors, so every cosine similarity is 0.
///
/// Relevance collapses to the normalization midpoint and ranking is driven
/// by recency and importance alone.
pub struct StubEmbeddingProvider {
    dims: usize,
}

impl StubEmbeddingProvider {
    /// Create a new stub provider with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

impl Default for StubEmbeddingProvider {
    fn default() -> Self {
        Self::new(16)
    }
}

impl EmbeddingProvider for StubEmbeddingProvider {
    fn embed(&self, _text: &str) -> Result<Embedding> {
        Ok(Embedding(vec![0.0; self.dims]))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "stub-zero-vector"
    }
}

// ---------------------------------------------------------------------------
// Hashed bag-of-words provider
// ---------------------------------------------------------------------------

/// Deterministic offline embedder: lower-cased words are hashed into
/// buckets and the count vector is L2-normalized.
///
/// Texts sharing words get positive similarity, which is enough signal for
/// offline runs and reproducible tests.
pub struct BagOfWordsEmbeddingProvider {
    dims: usize,
}

impl BagOfWordsEmbeddingProvider {
    /// Create a provider hashing into `dimensions` buckets.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dims: dimensions.max(1),
        }
    }
}

impl Default for BagOfWordsEmbeddingProvider {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EmbeddingProvider for BagOfWordsEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut counts = vec![0.0_f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (hasher.finish() % self.dims as u64) as usize;
            counts[bucket] += 1.0;
        }
        Ok(l2_normalize(counts))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "hashed-bag-of-words"
    }
}

fn l2_normalize(raw: Vec<f32>) -> Embedding {
    let mag: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag < f32::EPSILON {
        return Embedding(raw);
    }
    Embedding(raw.iter().map(|x| x / mag).collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
