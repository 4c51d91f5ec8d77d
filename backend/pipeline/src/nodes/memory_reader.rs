use anyhow::Result;
use tracing::{debug, warn};

use keel_core::ConversationState;

use crate::orchestrator::Orchestrator;

impl Orchestrator {
    /// Load long-term user context. A failed read degrades to an empty
    /// context; the pipeline never aborts here.
    pub(crate) async fn memory_reader(&self, state: &mut ConversationState) -> Result<()> {
        match self.with_timeout("memory read", self.memory.read(&state.user_id)).await {
            Ok(snapshot) => {
                let mut parts = snapshot.preferences;
                parts.extend(snapshot.insights);
                if parts.is_empty() {
                    debug!("No stored memory for user");
                } else {
                    debug!(items = parts.len(), "Loaded memory context");
                    state.signals.memory_context = Some(parts.join("; "));
                }
            }
            Err(err) => {
                warn!(error = %err, "Memory read failed; continuing with empty context");
                state.record_failure();
            }
        }
        Ok(())
    }
}
