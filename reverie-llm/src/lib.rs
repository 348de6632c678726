//! # reverie-llm — Language-Model Service Layer for Reverie
//!
//! Talks to the model backends the memory engine depends on:
//!   - **OpenAI-compatible APIs** (chat completions and embeddings)
//!   - **Ollama** (local)
//!
//! Layers, bottom up:
//!   - [`LlmClient`] makes exactly one HTTP attempt and classifies the
//!     failure as retryable or fatal.
//!   - [`LlmService`] retries with exponential backoff and bills every
//!     success to a shared [`CostTracker`].
//!   - [`BlockingEmbedder`] adapts the async service to the core's
//!     synchronous `EmbeddingProvider`.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod blocking;
pub mod client;
pub mod cost;
pub mod error;
pub mod service;
pub mod types;

pub use blocking::BlockingEmbedder;
pub use client::{LlmBackend, LlmClient, LlmProvider};
pub use cost::{CostReport, CostTracker};
pub use error::LlmError;
pub use service::LlmService;
pub use types::{ChatMessage, ChatRequest, ChatResponse, EmbeddingResponse, Role, Usage};
