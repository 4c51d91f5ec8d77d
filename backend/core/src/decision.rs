//! Gate decision values.

use serde::{Deserialize, Serialize};

/// The four possible gate outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Generate,
    AskClarify,
    SearchMore,
    Refuse,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Decision::Generate => "GENERATE",
            Decision::AskClarify => "ASK_CLARIFY",
            Decision::SearchMore => "SEARCH_MORE",
            Decision::Refuse => "REFUSE",
        };
        write!(f, "{s}")
    }
}

/// The four component sub-scores behind a composite grounding score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateMetrics {
    pub retrieval: f32,
    pub intent: f32,
    pub freshness: f32,
    pub diversity: f32,
}

/// An immutable gate decision. `reasons` is guaranteed non-empty and
/// `prohibit_memory_write` is derived from the decision, both enforced by
/// the constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingDecision {
    pub grounding_score: f32,
    pub decision: Decision,
    pub reasons: Vec<String>,
    pub metrics: GateMetrics,
    pub prohibit_memory_write: bool,
}

impl GroundingDecision {
    pub fn new(
        grounding_score: f32,
        decision: Decision,
        reasons: Vec<String>,
        metrics: GateMetrics,
    ) -> Self {
        let reasons = if reasons.is_empty() {
            vec![format!("decision {decision} with no recorded rationale")]
        } else {
            reasons
        };
        Self {
            grounding_score: grounding_score.clamp(0.0, 1.0),
            decision,
            reasons,
            metrics,
            prohibit_memory_write: decision != Decision::Generate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prohibit_flag_derived_from_decision() {
        let metrics = GateMetrics::default();
        let generate =
            GroundingDecision::new(0.9, Decision::Generate, vec!["ok".into()], metrics);
        assert!(!generate.prohibit_memory_write);

        for decision in [Decision::AskClarify, Decision::SearchMore, Decision::Refuse] {
            let d = GroundingDecision::new(0.2, decision, vec!["blocked".into()], metrics);
            assert!(d.prohibit_memory_write, "{decision} must prohibit memory writes");
        }
    }

    #[test]
    fn reasons_are_never_empty() {
        let d = GroundingDecision::new(0.5, Decision::Refuse, vec![], GateMetrics::default());
        assert!(!d.reasons.is_empty());
    }

    #[test]
    fn serde_round_trip_is_stable() {
        let d = GroundingDecision::new(
            0.73,
            Decision::SearchMore,
            vec!["stale cache".into()],
            GateMetrics { retrieval: 0.8, intent: 0.9, freshness: 0.3, diversity: 0.6 },
        );
        let json = serde_json::to_string(&d).unwrap();
        let back: GroundingDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }
}
