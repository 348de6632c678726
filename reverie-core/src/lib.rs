//! # Reverie Core Library
//!
//! Memory, retrieval and reflection engine for simulated personas.
//!
//! Every persona owns a [`MemoryStore`], an append-only associative memory
//! of three record kinds:
//!
//! - **Events** — what the persona perceived
//! - **Chats** — conversations it took part in
//! - **Thoughts** — insights it synthesized, citing their evidence
//!
//! On top of the store sit the two algorithmic pieces:
//!
//! - [`Retriever`] ranks memories against a focal point with a pluggable
//!   [`ScoringStrategy`] (recency, relevance and importance, each
//!   min-max normalized, then combined).
//! - [`Reflector`] decides via a pluggable [`ReflectionTrigger`] when to
//!   turn accumulated experience into new thoughts.
//!
//! Everything that needs a language model goes through the [`Cognition`]
//! and [`EmbeddingProvider`] traits, and every call has a fail-safe, so a
//! persona with no model behind it keeps running on defaults.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cognition;
pub mod config;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod observation;
pub mod persistence;
pub mod reflection;
pub mod retrieval;
pub mod types;

pub use cognition::{Cognition, Collaborators, Insight, OfflineCognition};
pub use config::ReverieConfig;
pub use embedding::EmbeddingProvider;
pub use error::{Result, ReverieError};
pub use memory::{MemoryRecord, MemoryState, MemoryStore, NewRecord};
pub use observation::{ChatContext, PerceivedEvent, Perception, observe};
pub use reflection::trigger::{ReflectionContext, ReflectionTrigger, TriggerResult};
pub use reflection::{Conversation, ReflectionCounters, ReflectionOutcome, ReflectionRequest, Reflector};
pub use retrieval::scoring::{ScoreMap, ScoringContext, ScoringStrategy};
pub use retrieval::{FocalRetrieval, RankedRecord, Retriever};
pub use types::*;
