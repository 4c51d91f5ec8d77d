use anyhow::Result;
use tracing::{debug, warn};

use keel_core::{ConversationState, MemoryWrite, Turn};

use crate::orchestrator::Orchestrator;

impl Orchestrator {
    /// Persist the completed exchange to long-term memory. Skipped when
    /// the gate prohibited writes, when there is no response, or when the
    /// subject confidence is too low to trust the exchange.
    pub(crate) async fn memory_writer(&self, state: &mut ConversationState) -> Result<()> {
        if state.prohibit_memory_write {
            debug!("Memory write prohibited by gate decision; skipping");
            return Ok(());
        }
        let Some(response) = state
            .signals
            .response_text
            .clone()
            .filter(|r| !r.trim().is_empty())
        else {
            debug!("No response to persist; skipping memory write");
            return Ok(());
        };

        let confidence = match self
            .with_timeout(
                "subject confidence",
                self.memory.subject_confidence(&state.conversation_id),
            )
            .await
        {
            Ok(confidence) => confidence,
            Err(err) => {
                warn!(error = %err, "Subject confidence check failed; skipping memory write");
                state.record_failure();
                return Ok(());
            }
        };
        if confidence < self.config.memory_min_subject_confidence {
            debug!(
                confidence,
                minimum = self.config.memory_min_subject_confidence,
                "Subject confidence too low; skipping memory write"
            );
            return Ok(());
        }

        let write = MemoryWrite {
            conversation_id: state.conversation_id.clone(),
            exchange: vec![
                Turn::user(state.latest_user_query()),
                Turn::assistant(response),
            ],
            tags: state
                .signals
                .trending
                .as_ref()
                .map(|t| t.topics.clone())
                .unwrap_or_default(),
            prohibited: state.prohibit_memory_write,
        };

        if let Err(err) = self.with_timeout("memory write", self.memory.write(write)).await {
            warn!(error = %err, "Memory write failed");
            state.record_failure();
        }
        Ok(())
    }
}
