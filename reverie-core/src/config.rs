//! Configuration for the reverie memory engine.
//!
//! Maps directly to `reverie.toml`. Every section is optional; missing keys
//! fall back to the defaults below, so a partial file is always valid.

use serde::{Deserialize, Serialize};

use crate::reflection::trigger::{
    AlwaysTrigger, CompositeTrigger, EventCountTrigger, HighImportanceEventTrigger,
    ImportanceThresholdTrigger, NeverTrigger, ReflectionTrigger, TimedTrigger,
};
use crate::retrieval::scoring::{
    AttentionBasedScoring, HybridRelevanceRecencyScoring, ImportanceOnlyScoring,
    LinearWeightedScoring, RecencyOnlyScoring, RelevanceOnlyScoring, ScoringContext,
    ScoringStrategy,
};

/// Top-level reverie configuration, loadable from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReverieConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Weighted retrieval settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Reflection trigger and synthesis settings.
    #[serde(default)]
    pub reflection: ReflectionConfig,
    /// Perception write-path settings.
    #[serde(default)]
    pub perception: PerceptionConfig,
    /// Persistence / save settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Language-model service settings.
    #[serde(default)]
    pub llm: LlmConfig,
}

impl ReverieConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ReverieError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::ReverieError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error. `RUST_LOG` wins if set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines instead of the human format.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// Which [`ScoringStrategy`] ranks weighted-retrieval candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringStrategyKind {
    /// Weighted sum of the three components.
    #[default]
    Linear,
    /// Softmax attention over the three weighted terms.
    Attention,
    /// Recency component only.
    RecencyOnly,
    /// Relevance component only.
    RelevanceOnly,
    /// Importance component only.
    ImportanceOnly,
    /// Recency times relevance.
    HybridRelevanceRecency,
}

impl ScoringStrategyKind {
    /// Instantiate the strategy. `temperature` only matters for attention.
    #[must_use]
    pub fn build(self, temperature: f64) -> Box<dyn ScoringStrategy> {
        match self {
            Self::Linear => Box::new(LinearWeightedScoring),
            Self::Attention => Box::new(AttentionBasedScoring::new(temperature)),
            Self::RecencyOnly => Box::new(RecencyOnlyScoring),
            Self::RelevanceOnly => Box::new(RelevanceOnlyScoring),
            Self::ImportanceOnly => Box::new(ImportanceOnlyScoring),
            Self::HybridRelevanceRecency => Box::new(HybridRelevanceRecencyScoring),
        }
    }
}

/// Per-agent weights applied on top of the fixed global multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightsConfig {
    /// Recency weight.
    #[serde(default = "default_1_0")]
    pub recency: f64,
    /// Relevance weight.
    #[serde(default = "default_1_0")]
    pub relevance: f64,
    /// Importance weight.
    #[serde(default = "default_1_0")]
    pub importance: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            recency: 1.0,
            relevance: 1.0,
            importance: 1.0,
        }
    }
}

/// Weighted retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Scoring strategy.
    #[serde(default)]
    pub strategy: ScoringStrategyKind,
    /// Softmax temperature for [`ScoringStrategyKind::Attention`].
    #[serde(default = "default_1_0")]
    pub attention_temperature: f64,
    /// Records returned per focal point.
    #[serde(default = "default_30")]
    pub top_n: usize,
    /// Per-position decay of the recency component.
    #[serde(default = "default_recency_decay")]
    pub recency_decay: f64,
    /// Per-agent factor weights.
    #[serde(default)]
    pub weights: WeightsConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: ScoringStrategyKind::default(),
            attention_temperature: 1.0,
            top_n: 30,
            recency_decay: default_recency_decay(),
            weights: WeightsConfig::default(),
        }
    }
}

impl RetrievalConfig {
    /// The per-query scoring context these settings describe.
    #[must_use]
    pub fn scoring_context(&self) -> ScoringContext {
        ScoringContext {
            recency_weight: self.weights.recency,
            relevance_weight: self.weights.relevance,
            importance_weight: self.weights.importance,
            recency_decay: self.recency_decay,
        }
    }

    /// Instantiate the configured scoring strategy.
    #[must_use]
    pub fn build_strategy(&self) -> Box<dyn ScoringStrategy> {
        self.strategy.build(self.attention_temperature)
    }
}

/// Serializable description of a [`ReflectionTrigger`] tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// Reflect once the importance budget is spent.
    #[default]
    ImportanceThreshold,
    /// Reflect after enough new events or thoughts.
    EventCount {
        /// Events since last reflection.
        #[serde(default = "default_50_u32")]
        event_threshold: u32,
        /// Thoughts since last reflection.
        #[serde(default = "default_20_u32")]
        thought_threshold: u32,
    },
    /// Reflect on a fixed simulated-time interval.
    Timed {
        /// Minutes of simulated time between reflections.
        #[serde(default = "default_180")]
        interval_minutes: u32,
    },
    /// Reflect whenever memories exist.
    Always,
    /// Never reflect.
    Never,
    /// Reflect when average importance since last reflection is high.
    HighImportanceEvent {
        /// Minimum average poignancy.
        #[serde(default = "default_8_0")]
        poignancy_threshold: f64,
    },
    /// Combine sub-triggers with AND / OR.
    Composite {
        /// Sub-triggers, evaluated in order.
        #[serde(default)]
        triggers: Vec<TriggerConfig>,
        /// AND when true, OR when false.
        #[serde(default)]
        require_all: bool,
    },
}

impl TriggerConfig {
    /// Instantiate the trigger tree.
    #[must_use]
    pub fn build(&self) -> Box<dyn ReflectionTrigger> {
        match self {
            Self::ImportanceThreshold => Box::new(ImportanceThresholdTrigger),
            Self::EventCount {
                event_threshold,
                thought_threshold,
            } => Box::new(EventCountTrigger::new(*event_threshold, *thought_threshold)),
            Self::Timed { interval_minutes } => Box::new(TimedTrigger::new(*interval_minutes)),
            Self::Always => Box::new(AlwaysTrigger),
            Self::Never => Box::new(NeverTrigger),
            Self::HighImportanceEvent {
                poignancy_threshold,
            } => Box::new(HighImportanceEventTrigger::new(*poignancy_threshold)),
            Self::Composite {
                triggers,
                require_all,
            } => Box::new(CompositeTrigger::new(
                triggers.iter().map(Self::build).collect(),
                *require_all,
            )),
        }
    }
}

/// Reflection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionConfig {
    /// Importance budget restored on reset.
    #[serde(default = "default_150")]
    pub importance_trigger_max: i32,
    /// Focal-point questions generated per cycle.
    #[serde(default = "default_3")]
    pub focal_points: usize,
    /// Insights requested per focal point.
    #[serde(default = "default_5")]
    pub insights_per_focal_point: usize,
    /// Days until a reflected thought expires.
    #[serde(default = "default_30_i64")]
    pub thought_ttl_days: i64,
    /// Seconds before a chat's end at which conversation reflection runs.
    #[serde(default = "default_10")]
    pub conversation_lookahead_secs: i64,
    /// Trigger tree.
    #[serde(default)]
    pub trigger: TriggerConfig,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            importance_trigger_max: 150,
            focal_points: 3,
            insights_per_focal_point: 5,
            thought_ttl_days: 30,
            conversation_lookahead_secs: 10,
            trigger: TriggerConfig::default(),
        }
    }
}

/// Perception settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionConfig {
    /// How many of the latest events a new perception is deduplicated against.
    #[serde(default = "default_5")]
    pub retention: usize,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self { retention: 5 }
    }
}

/// Persistence settings for the SQLite engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Detect save corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            checksum_enabled: true,
        }
    }
}

/// Language-model service settings, consumed by `reverie-llm`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "openai", "ollama" or "none".
    #[serde(default = "default_none")]
    pub provider: String,
    /// Base URL for the API.
    #[serde(default = "default_openai_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Chat-completion model.
    #[serde(default = "default_completion_model")]
    pub completion_model: String,
    /// Embedding model.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Retries after the first attempt for retryable failures.
    #[serde(default = "default_3_u32")]
    pub max_retries: u32,
    /// Base backoff delay; doubles per retry.
    #[serde(default = "default_1000")]
    pub retry_delay_ms: u64,
    /// Hard timeout for any single request.
    #[serde(default = "default_30000")]
    pub request_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_none(),
            base_url: default_openai_url(),
            api_key_env: default_api_key_env(),
            completion_model: default_completion_model(),
            embedding_model: default_embedding_model(),
            max_retries: 3,
            retry_delay_ms: 1000,
            request_timeout_ms: 30_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_none() -> String { "none".to_string() }
fn default_openai_url() -> String { "https://api.openai.com".to_string() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_completion_model() -> String { "gpt-3.5-turbo".to_string() }
fn default_embedding_model() -> String { "text-embedding-ada-002".to_string() }
fn default_1_0() -> f64 { 1.0 }
fn default_8_0() -> f64 { 8.0 }
fn default_recency_decay() -> f64 { 0.99 }
fn default_3() -> usize { 3 }
fn default_3_u32() -> u32 { 3 }
fn default_5() -> usize { 5 }
fn default_10() -> i64 { 10 }
fn default_20_u32() -> u32 { 20 }
fn default_30() -> usize { 30 }
fn default_30_i64() -> i64 { 30 }
fn default_50_u32() -> u32 { 50 }
fn default_150() -> i32 { 150 }
fn default_180() -> u32 { 180 }
fn default_1000() -> u64 { 1000 }
fn default_30000() -> u64 { 30_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = ReverieConfig::from_toml("").expect("parse");
        assert_eq!(config, ReverieConfig::default());
        assert_eq!(config.retrieval.top_n, 30);
        assert_eq!(config.reflection.importance_trigger_max, 150);
        assert_eq!(config.reflection.trigger, TriggerConfig::ImportanceThreshold);
        assert_eq!(config.llm.max_retries, 3);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ReverieConfig::from_toml(
            r#"
            [retrieval]
            strategy = "hybrid_relevance_recency"

            [retrieval.weights]
            relevance = 2.5
            "#,
        )
        .expect("parse");
        assert_eq!(config.retrieval.strategy, ScoringStrategyKind::HybridRelevanceRecency);
        assert!((config.retrieval.weights.relevance - 2.5).abs() < f64::EPSILON);
        assert!((config.retrieval.weights.recency - 1.0).abs() < f64::EPSILON);
        assert!((config.retrieval.recency_decay - 0.99).abs() < f64::EPSILON);
    }

    #[test]
    fn composite_trigger_tree_parses_and_builds() {
        let config = ReverieConfig::from_toml(
            r#"
            [reflection.trigger]
            kind = "composite"
            require_all = true

            [[reflection.trigger.triggers]]
            kind = "importance_threshold"

            [[reflection.trigger.triggers]]
            kind = "timed"
            interval_minutes = 60
            "#,
        )
        .expect("parse");
        assert_eq!(
            config.reflection.trigger,
            TriggerConfig::Composite {
                triggers: vec![
                    TriggerConfig::ImportanceThreshold,
                    TriggerConfig::Timed { interval_minutes: 60 },
                ],
                require_all: true,
            }
        );
        assert_eq!(config.reflection.trigger.build().name(), "composite");
    }

    #[test]
    fn event_count_defaults_apply_inside_tagged_variant() {
        let config = ReverieConfig::from_toml(
            r#"
            [reflection.trigger]
            kind = "event_count"
            thought_threshold = 4
            "#,
        )
        .expect("parse");
        assert_eq!(
            config.reflection.trigger,
            TriggerConfig::EventCount {
                event_threshold: 50,
                thought_threshold: 4,
            }
        );
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = ReverieConfig::from_toml("[retrieval]\nstrategy = \"psychic\"")
            .expect_err("unknown strategy");
        assert!(matches!(err, crate::ReverieError::Config(_)));
    }

    #[test]
    fn retrieval_config_builds_scoring_context() {
        let ctx = RetrievalConfig::default().scoring_context();
        assert!((ctx.recency_decay - 0.99).abs() < f64::EPSILON);
        assert!((ctx.importance_weight - 1.0).abs() < f64::EPSILON);
    }
}
