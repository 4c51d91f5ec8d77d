//! Conversation state threaded through the orchestration pipeline.
//!
//! One `ConversationState` is created per inbound request, mutated only by
//! the node currently executing, and discarded when the request completes.
//! It is never shared across concurrent requests and never persisted
//! directly (memory persistence is a downstream external write).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::decision::GroundingDecision;

/// Speaker role for a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single conversation turn. `messages` is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, text: text.into() }
    }
}

/// Input complexity class estimated by the prompt analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Moderate,
    High,
}

/// Trending detector output: does this query need fresh external data?
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingVerdict {
    pub needs_fresh_data: bool,
    pub topics: Vec<String>,
    pub candidate_urls: Vec<String>,
}

/// A fetched external page, post HTML-stripping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedPage {
    pub url: String,
    pub content: String,
}

/// Details of a semantic cache hit, recorded for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheHitInfo {
    pub similarity: f32,
    pub hit_count: u64,
}

/// Overall response risk as assessed by the quality analyst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Quality analyst output for a generated response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub score: f32,
    pub risk_level: RiskLevel,
}

/// Typed cross-node signals. Each node merges in only the fields it
/// produces; the struct is never replaced wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSignals {
    /// Memory reader: condensed user preferences/insights, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_context: Option<String>,

    /// Prompt analyzer outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,
    #[serde(default)]
    pub prompt_rewritten: bool,
    /// Filler-stripped query; downstream nodes prefer it when set so the
    /// original turn stays untouched (messages are append-only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewritten_query: Option<String>,

    /// Trending detector verdict (absent when the node was skipped).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trending: Option<TrendingVerdict>,

    /// Web scraper / summarizer outputs.
    #[serde(default)]
    pub scraped_pages: Vec<ScrapedPage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub scraping_failed: bool,

    /// Semantic cache hit details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<CacheHitInfo>,

    /// User-supplied grounding document ids (from request options).
    #[serde(default)]
    pub document_ids: Vec<String>,

    /// Set when the master agent's safety re-evaluation vetoed
    /// generation. Only this flag may route the master agent to a
    /// decision terminal; a failed generation attempt retries instead.
    #[serde(default)]
    pub generation_blocked: bool,

    /// Final response text, once produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,

    /// Quality analyst report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReport>,
}

/// The mutable state threaded through every pipeline node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub conversation_id: String,
    pub user_id: String,

    pub messages: Vec<Turn>,

    /// Append-only log of node names visited, for diagnostics and
    /// history-dependent routing.
    pub agent_path: Vec<String>,

    /// Last gate decision, if the gate has run.
    pub grounding_decision: Option<GroundingDecision>,

    /// Loop-protection counters. Monotonic; reset only at conversation
    /// creation.
    pub clarification_attempts: u32,
    pub search_attempts: u32,

    /// Incremented on any node error; consulted by the router to force
    /// the recovery path.
    pub failure_count: u32,

    /// Set whenever the gate decision is not Generate. The memory writer
    /// must honor it unconditionally.
    pub prohibit_memory_write: bool,

    pub signals: NodeSignals,

    /// Generic side-channel for cross-cutting diagnostic data only.
    /// Nodes merge their own keys in; the map is never replaced.
    #[serde(default)]
    pub diagnostics: HashMap<String, serde_json::Value>,
}

impl ConversationState {
    pub fn new(conversation_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            messages: Vec::new(),
            agent_path: Vec::new(),
            grounding_decision: None,
            clarification_attempts: 0,
            search_attempts: 0,
            failure_count: 0,
            prohibit_memory_write: false,
            signals: NodeSignals::default(),
            diagnostics: HashMap::new(),
        }
    }

    pub fn push_turn(&mut self, turn: Turn) {
        self.messages.push(turn);
    }

    /// Record a node visit in the agent path.
    pub fn visit(&mut self, node: impl Into<String>) {
        self.agent_path.push(node.into());
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
    }

    /// The most recent user turn, which is the query under evaluation.
    pub fn latest_user_query(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.text.as_str())
            .unwrap_or_default()
    }

    /// Stash a diagnostic value under `key`, merging into the existing map.
    pub fn annotate(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.diagnostics.insert(key.into(), value);
    }
}
