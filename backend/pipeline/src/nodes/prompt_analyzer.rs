use tracing::debug;

use keel_core::{Complexity, ConversationState};

use crate::analysis;
use crate::options::ProcessOptions;
use crate::orchestrator::Orchestrator;
use crate::router;

impl Orchestrator {
    /// Estimate cost and complexity for the query, rewriting it (filler
    /// stripped) when it is high-complexity or would blow the budget.
    /// The rewrite lands in `signals.rewritten_query`; the original turn
    /// is never edited.
    pub(crate) fn prompt_analyzer(
        &self,
        state: &mut ConversationState,
        options: &ProcessOptions,
    ) {
        let query = router::effective_query(state).to_string();
        let cost = analysis::estimate_cost_usd(&query);
        let complexity = analysis::classify_complexity(&query);
        debug!(cost_usd = cost, ?complexity, "Analyzed prompt");

        state.signals.estimated_cost_usd = Some(cost);
        state.signals.complexity = Some(complexity);

        let over_budget = options.cost_budget_usd.is_some_and(|budget| cost > budget);
        if over_budget || complexity == Complexity::High {
            let rewritten = analysis::strip_filler(&query);
            if rewritten != query && !rewritten.is_empty() {
                debug!(
                    original_len = query.len(),
                    rewritten_len = rewritten.len(),
                    "Rewrote prompt to trim filler"
                );
                state.signals.rewritten_query = Some(rewritten);
                state.signals.prompt_rewritten = true;
            }
        }
    }
}
