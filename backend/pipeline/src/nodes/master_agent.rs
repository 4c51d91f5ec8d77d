use anyhow::Result;
use tracing::{debug, warn};

use keel_core::{ConversationState, Decision, ModelHint, Turn};

use crate::options::ProcessOptions;
use crate::orchestrator::Orchestrator;
use crate::router;

impl Orchestrator {
    /// Generate the response. Carries a redundant safety check: if the
    /// node is ever reached without a gate decision, the gate is
    /// re-evaluated here. A disagreeing verdict vetoes generation via
    /// `signals.generation_blocked` only when the enforcement flags say
    /// decisions are enforced; otherwise generation proceeds with a
    /// warning, mirroring the gate node's own routing.
    pub(crate) async fn master_agent(
        &self,
        state: &mut ConversationState,
        options: &ProcessOptions,
    ) -> Result<()> {
        if state.grounding_decision.is_none() {
            warn!("Master agent reached without a grounding decision; re-evaluating");
            let ctx = self.build_grounding_context(state, options).await;
            let decision = self.gate.evaluate(&ctx).await;
            state.prohibit_memory_write = decision.prohibit_memory_write;

            let flags = self.controls.snapshot().flags;
            let enforcing =
                flags.blocking_enabled && !flags.shadow_mode && !flags.emergency_bypass;
            let blocking = match decision.decision {
                Decision::Generate => false,
                Decision::Refuse => enforcing && flags.strict_refusal,
                Decision::AskClarify | Decision::SearchMore => enforcing,
            };
            if decision.decision != Decision::Generate && !blocking {
                warn!(
                    decision = %decision.decision,
                    "Re-evaluated decision not enforced; proceeding to generation"
                );
            }
            state.grounding_decision = Some(decision);
            if blocking {
                warn!("Emergency re-evaluation vetoed generation");
                state.signals.generation_blocked = true;
                return Ok(());
            }
        }

        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        if let Some(memory) = &state.signals.memory_context {
            messages.push(Turn::system(format!("User context: {memory}")));
        }
        messages.extend(state.messages.iter().cloned());

        match self
            .with_timeout("generation", self.generation.generate(&messages, ModelHint::Primary))
            .await
        {
            Ok(text) if !text.trim().is_empty() => {
                debug!(chars = text.len(), "Generated response");
                self.populate_cache(state, &text).await;
                state.push_turn(Turn::assistant(text.clone()));
                state.signals.response_text = Some(text);
            }
            Ok(_) => {
                warn!("Generation returned empty text");
                state.record_failure();
            }
            Err(err) => {
                warn!(error = %err, failure_count = state.failure_count + 1, "Generation failed");
                state.record_failure();
            }
        }
        Ok(())
    }

    /// Best-effort cache population for well-grounded answers only. A
    /// degraded-refusal response must not be served to future
    /// near-duplicate queries.
    async fn populate_cache(&self, state: &ConversationState, response: &str) {
        let allowed = state
            .grounding_decision
            .as_ref()
            .is_some_and(|d| d.decision == Decision::Generate);
        if !allowed {
            return;
        }
        let query = router::effective_query(state).to_string();
        if let Err(err) = self.cache.store(&query, response).await {
            warn!(error = %err, "Semantic cache store failed");
        }
    }
}
