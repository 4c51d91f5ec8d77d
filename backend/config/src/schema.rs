//! Operator-control schema.
//!
//! These are the runtime-mutable safety dials for the grounding gate and
//! the pipeline. They are a live parameter set, not a config file: the
//! serde derives exist so operators can push updates over whatever control
//! plane the deployment has.

use serde::{Deserialize, Serialize};

/// Gate decision thresholds, all in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateThresholds {
    /// Composite score below this refuses outright.
    pub refuse: f32,
    /// Composite band above `refuse` where clarification is preferred.
    pub ask_clarify: f32,
    /// Composite band where another retrieval round is preferred.
    pub search_more: f32,
    /// Minimum intent confidence to generate without clarifying.
    pub intent_minimum: f32,
    /// Minimum retrieval sub-score for cost-optimizer agents.
    pub optimizer_retrieval_minimum: f32,
    /// Minimum freshness sub-score for time-sensitive cached answers.
    pub cache_minimum_freshness: f32,
    /// Intent confidence below which high context drift forces clarification.
    pub context_drift_intent_threshold: f32,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            refuse: 0.45,
            ask_clarify: 0.60,
            search_more: 0.60,
            intent_minimum: 0.70,
            optimizer_retrieval_minimum: 0.70,
            cache_minimum_freshness: 0.60,
            context_drift_intent_threshold: 0.75,
        }
    }
}

/// Weights for the composite grounding score. Applied as a weighted sum
/// over the four component sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateWeights {
    pub retrieval: f32,
    pub intent: f32,
    pub freshness: f32,
    pub diversity: f32,
}

impl Default for GateWeights {
    fn default() -> Self {
        Self { retrieval: 0.35, intent: 0.25, freshness: 0.20, diversity: 0.20 }
    }
}

/// The four operational kill-switches / rollout flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureFlags {
    /// Compute and log decisions without enforcing them.
    pub shadow_mode: bool,
    /// Master enable for enforcement; false behaves like shadow mode.
    pub blocking_enabled: bool,
    /// Route Refuse decisions to the refusal terminal instead of
    /// degrading to generation with a warning.
    pub strict_refusal: bool,
    /// Operational kill-switch: force Generate unconditionally.
    pub emergency_bypass: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            shadow_mode: false,
            blocking_enabled: true,
            strict_refusal: false,
            emergency_bypass: false,
        }
    }
}

/// Full gate configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateConfig {
    pub thresholds: GateThresholds,
    pub weights: GateWeights,
    pub flags: FeatureFlags,
    /// Decision stickiness window in seconds.
    pub stickiness_ttl_secs: u64,
    /// Loop-protection caps; reaching either refuses outright.
    pub max_clarification_attempts: u32,
    pub max_search_attempts: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            thresholds: GateThresholds::default(),
            weights: GateWeights::default(),
            flags: FeatureFlags::default(),
            stickiness_ttl_secs: 120,
            max_clarification_attempts: 2,
            max_search_attempts: 2,
        }
    }
}

/// Semantic response cache tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
    /// Cosine similarity at or above which a lookup counts as a hit.
    pub hit_threshold: f32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 1000, ttl_secs: 3600, hit_threshold: 0.85 }
    }
}

/// Orchestrator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Timeout applied to every external call a node makes.
    pub node_timeout_ms: u64,
    /// Bounded fan-out for web fetches.
    pub fetch_concurrency: usize,
    /// Courtesy pause between fetch batches, for external rate limits.
    pub fetch_batch_delay_ms: u64,
    /// Failure count at which the router forces the recovery path.
    pub max_failures: u32,
    /// Retrieval depth for gate evidence.
    pub search_k: usize,
    /// Exchanges below this subject confidence are not persisted.
    pub memory_min_subject_confidence: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            node_timeout_ms: 10_000,
            fetch_concurrency: 3,
            fetch_batch_delay_ms: 250,
            max_failures: 3,
            search_k: 5,
            memory_min_subject_confidence: 0.5,
        }
    }
}
