use anyhow::Result;
use tracing::{info, warn};

use keel_core::{ConversationState, Turn};

use crate::orchestrator::Orchestrator;

impl Orchestrator {
    /// Terminal: ask the user to sharpen the query. Counts toward loop
    /// protection so repeated clarifications converge on a refusal.
    pub(crate) fn clarification_needed(&self, state: &mut ConversationState) {
        state.clarification_attempts += 1;
        state.prohibit_memory_write = true;

        let reasons = decision_reasons(state)
            .unwrap_or_else(|| vec!["I need more context to answer reliably.".to_string()]);
        let message = format!(
            "I need a little more detail before I can answer. {}",
            reasons.join(" ")
        );
        info!(attempts = state.clarification_attempts, "Asking for clarification");
        state.push_turn(Turn::assistant(message.clone()));
        state.signals.response_text = Some(message);
    }

    /// Terminal: decline to answer rather than guess.
    pub(crate) fn refuse_safely(&self, state: &mut ConversationState) {
        state.prohibit_memory_write = true;

        let reasons = decision_reasons(state)
            .unwrap_or_else(|| vec!["I don't have reliable grounding for this.".to_string()]);
        let message = format!(
            "I can't give you a reliable answer here. {} \
             Rephrasing or adding more context may help.",
            reasons.join(" ")
        );
        info!("Refusing safely");
        state.push_turn(Turn::assistant(message.clone()));
        state.signals.response_text = Some(message);
    }

    /// Terminal: back off, retry once on the degraded model, fall back to
    /// the apology. Never errors.
    pub(crate) async fn failure_recovery(&self, state: &mut ConversationState) -> Result<()> {
        warn!(failure_count = state.failure_count, "Entering failure recovery");
        let text = self
            .recovery
            .recover(self.generation.as_ref(), &state.messages, state.failure_count)
            .await;
        state.push_turn(Turn::assistant(text.clone()));
        state.signals.response_text = Some(text);
        Ok(())
    }
}

fn decision_reasons(state: &ConversationState) -> Option<Vec<String>> {
    state
        .grounding_decision
        .as_ref()
        .map(|d| d.reasons.clone())
        .filter(|r| !r.is_empty())
}
