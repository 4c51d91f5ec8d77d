//! Request surface for the orchestrator.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use keel_core::Turn;

/// Chat mode preference: latency, cost, or a middle ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    Fastest,
    Cheapest,
    #[default]
    Balanced,
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub chat_mode: ChatMode,
    /// Soft budget for the whole exchange, in USD.
    pub cost_budget_usd: Option<f64>,
    /// Prior turns of the conversation, oldest first.
    pub prior_messages: Vec<Turn>,
    /// User-supplied grounding documents. Presence disables web lookup.
    pub document_ids: Vec<String>,
    /// Cancelled when the caller goes away; the run stops after the
    /// currently executing node completes.
    pub cancellation: CancellationToken,
}

/// One inbound request to the orchestration state machine.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub conversation_id: String,
    pub user_id: String,
    pub query: String,
    pub options: ProcessOptions,
}

impl ProcessRequest {
    pub fn new(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            query: query.into(),
            options: ProcessOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ProcessOptions) -> Self {
        self.options = options;
        self
    }
}
