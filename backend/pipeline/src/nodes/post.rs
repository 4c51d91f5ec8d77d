use serde_json::json;
use tracing::{debug, warn};

use keel_core::{ConversationState, QualityReport, RiskLevel};

use crate::analysis;
use crate::options::ProcessOptions;
use crate::orchestrator::Orchestrator;

impl Orchestrator {
    /// Attribute a cost estimate to the full exchange. Advisory only: an
    /// over-budget exchange is logged, never truncated after the fact.
    pub(crate) fn cost_optimizer(&self, state: &mut ConversationState, options: &ProcessOptions) {
        let response_cost = state
            .signals
            .response_text
            .as_deref()
            .map(analysis::estimate_cost_usd)
            .unwrap_or(0.0);
        let total = response_cost + state.signals.estimated_cost_usd.unwrap_or(0.0);
        state.annotate("exchangeCostUsd", json!(total));

        if let Some(budget) = options.cost_budget_usd {
            if total > budget {
                warn!(cost_usd = total, budget_usd = budget, "Exchange exceeded cost budget");
            }
        }
        debug!(cost_usd = total, "Costed exchange");
    }

    /// Heuristic quality score for the generated response. Feeds
    /// diagnostics only; it never changes the response.
    pub(crate) fn quality_analyst(&self, state: &mut ConversationState) {
        let response = state.signals.response_text.as_deref().unwrap_or_default();

        let mut score: f32 = 0.5;
        if response.len() > 80 {
            score += 0.2;
        }
        if state
            .grounding_decision
            .as_ref()
            .is_some_and(|d| d.grounding_score > 0.6)
        {
            score += 0.2;
        }
        if !state.signals.scraping_failed {
            score += 0.1;
        }
        let score = score.clamp(0.0, 1.0);

        let risk_level = if score < 0.4 || state.prohibit_memory_write {
            RiskLevel::High
        } else if score < 0.7 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        debug!(score, ?risk_level, "Assessed response quality");
        state.signals.quality = Some(QualityReport { score, risk_level });
    }
}
