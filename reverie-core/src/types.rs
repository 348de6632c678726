//! Core type definitions for the reverie memory engine.
//!
//! All types are serializable; timestamps are simulated time, never wall-clock.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ReverieError;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for a memory record.
///
/// Wraps the global 1-based creation count; rendered as `node_<n>` in
/// persisted snapshots. Ids are handed out by the store and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemoryId(pub u32);

impl MemoryId {
    /// The global creation count this id was minted from.
    #[must_use]
    pub fn count(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

impl FromStr for MemoryId {
    type Err = ReverieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("node_")
            .and_then(|n| n.parse::<u32>().ok())
            .map(MemoryId)
            .ok_or_else(|| ReverieError::Serialization(format!("invalid memory id '{s}'")))
    }
}

impl Serialize for MemoryId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MemoryId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The three kinds of experience a persona records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// A raw observation ("Klaus is reading a book").
    Event,
    /// A synthesized insight derived from other records.
    Thought,
    /// A conversation log.
    Chat,
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Event => "event",
            Self::Thought => "thought",
            Self::Chat => "chat",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A point in simulated time.
pub type SimTime = NaiveDateTime;

/// Canonical snapshot format, e.g. `"February 13, 2023, 08:00:00"`.
pub const SIM_TIME_FORMAT: &str = "%B %d, %Y, %H:%M:%S";

/// Older snapshots wrote ISO-like timestamps; accepted on load only.
const LEGACY_SIM_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render a simulated timestamp in the canonical snapshot format.
#[must_use]
pub fn format_sim_time(t: &SimTime) -> String {
    t.format(SIM_TIME_FORMAT).to_string()
}

/// Parse a simulated timestamp from either the canonical or the legacy format.
///
/// # Errors
/// Returns [`ReverieError::InvalidTimestamp`] if neither format matches.
pub fn parse_sim_time(s: &str) -> crate::error::Result<SimTime> {
    NaiveDateTime::parse_from_str(s, SIM_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, LEGACY_SIM_TIME_FORMAT))
        .map_err(|_| ReverieError::InvalidTimestamp(s.to_string()))
}

/// Serde adapter for [`SimTime`] fields using [`SIM_TIME_FORMAT`].
pub mod sim_time_format {
    use super::{SimTime, format_sim_time, parse_sim_time};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a timestamp as formatted text.
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(t: &SimTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_sim_time(t))
    }

    /// Deserialize a timestamp from formatted text.
    ///
    /// # Errors
    /// Fails if the text is not a recognised timestamp.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SimTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_sim_time(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional [`SimTime`] fields (`null` when absent).
pub mod option_sim_time_format {
    use super::{SimTime, format_sim_time, parse_sim_time};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize an optional timestamp as formatted text or `null`.
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(
        t: &Option<SimTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => serializer.serialize_some(&format_sim_time(t)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional timestamp.
    ///
    /// # Errors
    /// Fails if present text is not a recognised timestamp.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<SimTime>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| parse_sim_time(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Semantic triple
// ---------------------------------------------------------------------------

/// A `(subject, predicate, object)` description of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    /// Who or what acts, possibly a `world:sector:arena` path.
    pub subject: String,
    /// The relation ("is", "chat with", ...).
    pub predicate: String,
    /// The target, possibly a path.
    pub object: String,
}

impl Triple {
    /// Build a triple from anything string-like.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// The fail-safe triple used when the cognition collaborator cannot
    /// describe an action: `(name, "is", "idle")`.
    #[must_use]
    pub fn idle(name: impl Into<String>) -> Self {
        Self::new(name, "is", "idle")
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.predicate, self.object)
    }
}

/// Strip a `world:sector:arena` style prefix, keeping the final segment.
#[must_use]
pub fn last_path_segment(path: &str) -> &str {
    path.rsplit(':').next().unwrap_or(path)
}

// ---------------------------------------------------------------------------
// Memory Embedding Vector
// ---------------------------------------------------------------------------

/// A dense vector embedding for semantic similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Cosine similarity between two embeddings.
    ///
    /// Returns 0.0 if either vector has zero norm or the dimensions differ.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return 0.0;
        }
        let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom < f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn feb13() -> SimTime {
        NaiveDate::from_ymd_opt(2023, 2, 13)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .expect("valid date")
    }

    #[test]
    fn memory_id_renders_as_node() {
        assert_eq!(MemoryId(7).to_string(), "node_7");
        assert_eq!("node_42".parse::<MemoryId>().expect("parse"), MemoryId(42));
        assert!("42".parse::<MemoryId>().is_err());
        assert!("node_x".parse::<MemoryId>().is_err());
    }

    #[test]
    fn sim_time_uses_long_month_format() {
        assert_eq!(format_sim_time(&feb13()), "February 13, 2023, 08:00:00");
        assert_eq!(
            parse_sim_time("February 13, 2023, 08:00:00").expect("parse"),
            feb13()
        );
    }

    #[test]
    fn sim_time_accepts_legacy_format() {
        assert_eq!(parse_sim_time("2023-02-13 08:00:00").expect("parse"), feb13());
        assert!(parse_sim_time("yesterday").is_err());
    }

    #[test]
    fn path_prefix_is_stripped() {
        assert_eq!(last_path_segment("the Ville:Hobbs Cafe:cafe:counter"), "counter");
        assert_eq!(last_path_segment("Klaus Mueller"), "Klaus Mueller");
    }

    #[test]
    fn cosine_zero_norm_is_zero() {
        let a = Embedding(vec![0.0, 0.0]);
        let b = Embedding(vec![1.0, 0.0]);
        assert_eq!(a.cosine_similarity(&b), 0.0);
        assert!((b.cosine_similarity(&b) - 1.0).abs() < 1e-6);
    }
}
