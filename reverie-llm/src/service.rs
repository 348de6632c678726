//! LLM service: retries, backoff and cost tracking around a backend.
//!
//! Retryable failures are retried up to `max_retries` times, sleeping
//! `retry_delay * 2^(attempt - 1)` before each retry. Fatal failures are
//! returned immediately. Every success is billed to the shared
//! [`CostTracker`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reverie_core::config::LlmConfig;
use tracing::{debug, error, warn};

use crate::client::{LlmBackend, LlmClient};
use crate::cost::CostTracker;
use crate::error::LlmError;
use crate::types::ChatRequest;

/// Text embedded in place of an empty string.
pub const BLANK_EMBEDDING_TEXT: &str = "this is blank";

/// Retrying front end over an [`LlmBackend`].
pub struct LlmService<B = LlmClient> {
    backend: B,
    max_retries: u32,
    retry_delay: Duration,
    costs: Arc<CostTracker>,
}

impl LlmService<LlmClient> {
    /// Build an HTTP-backed service from configuration.
    ///
    /// # Errors
    /// See [`LlmClient::from_config`].
    pub fn from_config(config: &LlmConfig, costs: Arc<CostTracker>) -> Result<Self, LlmError> {
        Ok(Self::new(
            LlmClient::from_config(config)?,
            config.max_retries,
            Duration::from_millis(config.retry_delay_ms),
            costs,
        ))
    }
}

impl<B: LlmBackend> LlmService<B> {
    /// Wrap a backend.
    #[must_use]
    pub fn new(backend: B, max_retries: u32, retry_delay: Duration, costs: Arc<CostTracker>) -> Self {
        Self {
            backend,
            max_retries,
            retry_delay,
            costs,
        }
    }

    /// The shared cost tracker.
    #[must_use]
    pub fn costs(&self) -> &Arc<CostTracker> {
        &self.costs
    }

    /// The wrapped backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Chat completion text.
    ///
    /// # Errors
    /// A fatal [`LlmError`], or [`LlmError::RetriesExhausted`].
    pub async fn chat(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let response = self.with_retry("chat", || self.backend.chat(request)).await?;
        self.costs
            .record(&response.model, response.usage.prompt_tokens, response.usage.completion_tokens);
        Ok(response.text)
    }

    /// Embedding of `text` with newlines flattened; empty text is embedded
    /// as [`BLANK_EMBEDDING_TEXT`].
    ///
    /// # Errors
    /// A fatal [`LlmError`], or [`LlmError::RetriesExhausted`].
    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, LlmError> {
        let flattened = text.replace('\n', " ");
        let input = if flattened.is_empty() { BLANK_EMBEDDING_TEXT } else { flattened.as_str() };
        let response = self.with_retry("embed", || self.backend.embed(model, input)).await?;
        self.costs.record(&response.model, response.usage.prompt_tokens, 0);
        Ok(response.vector)
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut retries = 0u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    retries += 1;
                    if retries > self.max_retries {
                        error!(operation, attempts = retries, error = %e, "LLM retries exhausted");
                        return Err(LlmError::RetriesExhausted {
                            attempts: retries,
                            last_error: e.to_string(),
                        });
                    }
                    let delay = backoff_delay(self.retry_delay, retries);
                    warn!(
                        operation,
                        attempt = retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "LLM call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!(operation, error = %e, "LLM call failed fatally");
                    return Err(e);
                }
            }
        }
    }
}

/// `base * 2^(retry - 1)`, saturating at `Duration::MAX`.
fn backoff_delay(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
}
