//! The routing function: a pure map from (node, state) to the next node.
//!
//! Keeping this separate from the handlers means the whole graph can be
//! unit-tested without running any node.

use tracing::{error, warn};

use keel_config::FeatureFlags;
use keel_core::{ConversationState, Decision};

use crate::analysis;
use crate::node::NodeId;
use crate::options::ChatMode;

/// Routing inputs that come from outside the conversation state.
#[derive(Debug, Clone, Copy)]
pub struct RouteContext {
    pub flags: FeatureFlags,
    pub chat_mode: ChatMode,
    pub max_failures: u32,
}

/// Decide the node to run after `current`. Deterministic on its inputs.
pub fn next_node(current: NodeId, state: &ConversationState, route: &RouteContext) -> NodeId {
    match current {
        NodeId::MemoryReader => NodeId::PromptAnalyzer,

        NodeId::PromptAnalyzer => {
            // User-supplied documents strictly outrank web lookup, even for
            // time-sensitive queries: the user's intent is document
            // analysis, not a news check.
            if !state.signals.document_ids.is_empty() {
                NodeId::SemanticCache
            } else if analysis::needs_live_data(effective_query(state)) {
                NodeId::TrendingDetector
            } else {
                NodeId::SemanticCache
            }
        }

        NodeId::TrendingDetector => match &state.signals.trending {
            Some(verdict) if verdict.needs_fresh_data && !verdict.candidate_urls.is_empty() => {
                NodeId::WebScraper
            }
            _ => NodeId::SemanticCache,
        },

        // Always on to the gate, success or not, so the gate can factor in
        // scraping failure.
        NodeId::WebScraper => NodeId::ContentSummarizer,
        NodeId::ContentSummarizer => NodeId::GroundingGate,

        NodeId::SemanticCache => {
            if state.signals.cache_hit.is_some() {
                NodeId::End
            } else {
                NodeId::GroundingGate
            }
        }

        NodeId::GroundingGate => route_after_gate(state, route),

        NodeId::MasterAgent => route_after_master(state, route),

        NodeId::CostOptimizer => {
            if route.chat_mode == ChatMode::Balanced {
                NodeId::QualityAnalyst
            } else {
                NodeId::MemoryWriter
            }
        }
        NodeId::QualityAnalyst => NodeId::MemoryWriter,
        NodeId::MemoryWriter => NodeId::End,

        // Terminals.
        NodeId::ClarificationNeeded
        | NodeId::RefuseSafely
        | NodeId::FailureRecovery
        | NodeId::End => NodeId::End,
    }
}

fn route_after_gate(state: &ConversationState, route: &RouteContext) -> NodeId {
    let Some(decision) = &state.grounding_decision else {
        // A gate node that completed without a decision is a routing bug;
        // fail safe toward clarification, never generation.
        error!("Gate node completed without a decision; failing safe to clarification");
        return NodeId::ClarificationNeeded;
    };

    let enforcing =
        route.flags.blocking_enabled && !route.flags.shadow_mode && !route.flags.emergency_bypass;
    if !enforcing {
        if decision.decision != Decision::Generate {
            warn!(
                decision = %decision.decision,
                "Gate decision not enforced (shadow/bypass); proceeding to generation"
            );
        }
        return NodeId::MasterAgent;
    }

    match decision.decision {
        Decision::Generate => NodeId::MasterAgent,
        Decision::AskClarify => NodeId::ClarificationNeeded,
        Decision::SearchMore => NodeId::WebScraper,
        Decision::Refuse => {
            if route.flags.strict_refusal {
                NodeId::RefuseSafely
            } else {
                // Soft-launch behavior for the refusal policy.
                warn!("Refuse decision degraded to generation (strict refusal disabled)");
                NodeId::MasterAgent
            }
        }
    }
}

fn route_after_master(state: &ConversationState, route: &RouteContext) -> NodeId {
    // The master agent's safety re-evaluation is the only thing that may
    // send this node to a decision terminal. A decision merely left in
    // state (a degraded soft refusal, a shadow-mode verdict) must not be
    // enforced here; a failed generation attempt retries toward the cap.
    if state.signals.generation_blocked {
        let Some(decision) = &state.grounding_decision else {
            error!("Generation vetoed without a decision in state; failing safe");
            return NodeId::ClarificationNeeded;
        };
        return match decision.decision {
            Decision::AskClarify => NodeId::ClarificationNeeded,
            Decision::SearchMore => NodeId::WebScraper,
            Decision::Refuse => NodeId::RefuseSafely,
            // A Generate verdict never vetoes; treat as a retry.
            Decision::Generate => NodeId::MasterAgent,
        };
    }

    if state.signals.response_text.is_none() {
        // Generation failed; retry until the failure cap forces recovery.
        if state.failure_count >= route.max_failures {
            return NodeId::FailureRecovery;
        }
        return NodeId::MasterAgent;
    }

    if state.failure_count >= route.max_failures {
        return NodeId::FailureRecovery;
    }
    match route.chat_mode {
        ChatMode::Fastest => NodeId::MemoryWriter,
        ChatMode::Cheapest | ChatMode::Balanced => NodeId::CostOptimizer,
    }
}

/// The query downstream nodes should operate on.
pub(crate) fn effective_query(state: &ConversationState) -> &str {
    state
        .signals
        .rewritten_query
        .as_deref()
        .unwrap_or_else(|| state.latest_user_query())
}
