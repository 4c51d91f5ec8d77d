//! Pipeline node identifiers.
//!
//! The state machine is explicit data: this enum, the handler dispatch in
//! the orchestrator, and the routing function in `router.rs`. No node is
//! registered dynamically, so the whole graph is inspectable in tests.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    MemoryReader,
    PromptAnalyzer,
    TrendingDetector,
    WebScraper,
    ContentSummarizer,
    SemanticCache,
    GroundingGate,
    ClarificationNeeded,
    RefuseSafely,
    MasterAgent,
    CostOptimizer,
    QualityAnalyst,
    MemoryWriter,
    FailureRecovery,
    End,
}

impl NodeId {
    pub const ALL: [NodeId; 15] = [
        NodeId::MemoryReader,
        NodeId::PromptAnalyzer,
        NodeId::TrendingDetector,
        NodeId::WebScraper,
        NodeId::ContentSummarizer,
        NodeId::SemanticCache,
        NodeId::GroundingGate,
        NodeId::ClarificationNeeded,
        NodeId::RefuseSafely,
        NodeId::MasterAgent,
        NodeId::CostOptimizer,
        NodeId::QualityAnalyst,
        NodeId::MemoryWriter,
        NodeId::FailureRecovery,
        NodeId::End,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeId::MemoryReader => "memory_reader",
            NodeId::PromptAnalyzer => "prompt_analyzer",
            NodeId::TrendingDetector => "trending_detector",
            NodeId::WebScraper => "web_scraper",
            NodeId::ContentSummarizer => "content_summarizer",
            NodeId::SemanticCache => "semantic_cache",
            NodeId::GroundingGate => "grounding_gate",
            NodeId::ClarificationNeeded => "clarification_needed",
            NodeId::RefuseSafely => "refuse_safely",
            NodeId::MasterAgent => "master_agent",
            NodeId::CostOptimizer => "cost_optimizer",
            NodeId::QualityAnalyst => "quality_analyst",
            NodeId::MemoryWriter => "memory_writer",
            NodeId::FailureRecovery => "failure_recovery",
            NodeId::End => "__end__",
        }
    }

    /// Terminal nodes end the run once their handler completes.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeId::ClarificationNeeded
                | NodeId::RefuseSafely
                | NodeId::FailureRecovery
                | NodeId::End
        )
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
