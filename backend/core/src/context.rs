//! Grounding context: the gate's read-only view of one evaluation.
//!
//! Built fresh for every gate call from the conversation state plus the
//! retrieval adapter's output. The gate never reads the conversation state
//! directly; everything it may consider is copied in here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse classification of what the query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Factual,
    Action,
    Opinion,
    Mixed,
}

/// Which agent class is asking. Cost-optimizer agents demand stronger
/// retrieval evidence before generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentClass {
    #[default]
    Standard,
    CostOptimizer,
}

/// Where a retrieved hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Document,
    Web,
    Memory,
    Cache,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceType::Document => "document",
            SourceType::Web => "web",
            SourceType::Memory => "memory",
            SourceType::Cache => "cache",
        };
        write!(f, "{s}")
    }
}

/// One retrieved evidence item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedSource {
    pub source_type: SourceType,
    pub source_id: String,
    /// Similarity to the query in [0, 1].
    pub similarity: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Retrieved content, carried for downstream summarization. Not
    /// considered by the gate itself.
    #[serde(default)]
    pub content: String,
}

/// Aggregate retrieval evidence for one evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalSignals {
    pub hit_count: usize,
    pub max_similarity: f32,
    pub mean_similarity: f32,
    pub sources: Vec<RetrievedSource>,
}

impl RetrievalSignals {
    /// Derive the aggregate from a raw source list.
    pub fn from_sources(sources: Vec<RetrievedSource>) -> Self {
        let hit_count = sources.len();
        let max_similarity = sources.iter().map(|s| s.similarity).fold(0.0f32, f32::max);
        let mean_similarity = if hit_count == 0 {
            0.0
        } else {
            sources.iter().map(|s| s.similarity).sum::<f32>() / hit_count as f32
        };
        Self { hit_count, max_similarity, mean_similarity, sources }
    }

    /// Number of distinct source types among the hits.
    pub fn distinct_source_types(&self) -> usize {
        let mut seen = std::collections::HashSet::new();
        for s in &self.sources {
            seen.insert(s.source_type);
        }
        seen.len()
    }
}

/// Intent analysis for the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentSignals {
    /// Confidence in [0, 1] that the detected intent is correct.
    pub confidence: f32,
    pub ambiguous: bool,
}

/// Cache-freshness signals, present only when a cached answer is in play.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSignals {
    pub used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

/// Everything the gate considers for one decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingContext {
    pub conversation_id: String,
    pub query: String,
    pub query_type: QueryType,
    pub retrieval: RetrievalSignals,
    pub intent: IntentSignals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheSignals>,
    pub time_sensitive: bool,
    pub context_drift_high: bool,
    /// Presence implies the user explicitly supplied grounding documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<String>>,
    #[serde(default)]
    pub agent_class: AgentClass,
    /// Loop-protection counters carried over from the conversation state.
    #[serde(default)]
    pub clarification_attempts: u32,
    #[serde(default)]
    pub search_attempts: u32,
}

impl GroundingContext {
    /// A minimal context for the given query, useful as a builder base.
    pub fn new(conversation_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            query: query.into(),
            query_type: QueryType::Mixed,
            retrieval: RetrievalSignals::default(),
            intent: IntentSignals { confidence: 0.5, ambiguous: false },
            cache: None,
            time_sensitive: false,
            context_drift_high: false,
            document_ids: None,
            agent_class: AgentClass::Standard,
            clarification_attempts: 0,
            search_attempts: 0,
        }
    }
}
