//! Final result of one orchestration run.

use serde::{Deserialize, Serialize};

use keel_core::GroundingDecision;

/// How the run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Full pipeline ran and generated a response.
    Completed,
    /// Served from the semantic cache.
    CacheHit,
    /// Terminated asking the user to clarify.
    Clarification,
    /// Terminated with a safe refusal.
    Refusal,
    /// Terminated through the failure-recovery path.
    Recovered,
}

/// The user-facing result plus run diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalResult {
    /// Never empty; the recovery apology is the floor.
    pub response: String,
    pub outcome: Outcome,
    pub agent_path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<GroundingDecision>,
    pub failure_count: u32,
}
