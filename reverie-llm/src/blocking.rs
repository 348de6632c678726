//! Synchronous embedding adapter for the core engine.
//!
//! The core is synchronous, so [`BlockingEmbedder`] owns a single-threaded
//! tokio runtime and blocks on each request. It must not be called from
//! inside another tokio runtime.

use std::sync::Arc;

use reverie_core::config::LlmConfig;
use reverie_core::embedding::EmbeddingProvider;
use reverie_core::{Embedding, ReverieError};
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use crate::client::{LlmBackend, LlmClient};
use crate::cost::CostTracker;
use crate::error::LlmError;
use crate::service::LlmService;

/// Output size of `text-embedding-ada-002`.
pub const ADA_002_DIMENSIONS: usize = 1536;

/// [`EmbeddingProvider`] backed by an [`LlmService`].
///
/// Nothing is cached here; the memory store caches vectors by key.
pub struct BlockingEmbedder<B = LlmClient> {
    runtime: Runtime,
    service: LlmService<B>,
    model: String,
    dimensions: usize,
}

impl BlockingEmbedder<LlmClient> {
    /// Build an HTTP-backed embedder from configuration.
    ///
    /// # Errors
    /// Client construction failures, or [`LlmError::ConfigError`] if the
    /// runtime cannot start.
    pub fn from_config(config: &LlmConfig, costs: Arc<CostTracker>) -> Result<Self, LlmError> {
        Self::new(
            LlmService::from_config(config, costs)?,
            config.embedding_model.clone(),
            ADA_002_DIMENSIONS,
        )
    }
}

impl<B: LlmBackend> BlockingEmbedder<B> {
    /// Wrap a service.
    ///
    /// # Errors
    /// [`LlmError::ConfigError`] if the runtime cannot start.
    pub fn new(service: LlmService<B>, model: impl Into<String>, dimensions: usize) -> Result<Self, LlmError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| LlmError::ConfigError(format!("cannot start embedding runtime: {e}")))?;
        Ok(Self {
            runtime,
            service,
            model: model.into(),
            dimensions,
        })
    }

    /// The wrapped service.
    #[must_use]
    pub fn service(&self) -> &LlmService<B> {
        &self.service
    }
}

impl<B: LlmBackend> EmbeddingProvider for BlockingEmbedder<B> {
    fn embed(&self, text: &str) -> reverie_core::Result<Embedding> {
        let vector = self
            .runtime
            .block_on(self.service.embed(&self.model, text))
            .map_err(|e| ReverieError::Embedding(e.to_string()))?;
        debug!(model = %self.model, dimensions = vector.len(), "Embedded text");
        Ok(Embedding(vector))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
