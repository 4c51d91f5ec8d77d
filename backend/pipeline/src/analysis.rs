//! Cheap query heuristics shared by the pipeline nodes.
//!
//! These are deliberately simple keyword/shape heuristics: they gate which
//! nodes run, not what gets generated, and they must stay deterministic so
//! routing is reproducible.

use once_cell::sync::Lazy;
use regex::Regex;

use keel_core::{Complexity, ConversationState, IntentSignals, QueryType};

static OPINION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(think|opinion|feel about|prefer|favorite|favourite|better|best|recommend|worth it)\b")
        .expect("opinion pattern compiles")
});

static ACTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(create|delete|update|send|schedule|deploy|install|write|draft|summarize|translate|fix)\b")
        .expect("action pattern compiles")
});

static LIVE_DATA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(latest|today|now|currently|current|breaking|news|price|weather|stock|score|release[sd]?|trending)\b")
        .expect("live-data pattern compiles")
});

static INTERROGATIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(what|how|why|when|where|who|which|is|are|does|do|can)\b")
        .expect("interrogative pattern compiles")
});

const FILLER_WORDS: &[&str] = &[
    "please", "basically", "actually", "just", "really", "very", "quite", "kindly", "perhaps",
    "maybe", "somehow", "literally",
];

/// Classify what the query asks for.
pub fn classify_query_type(query: &str) -> QueryType {
    let opinion = OPINION_RE.is_match(query);
    let action = ACTION_RE.is_match(query);
    match (opinion, action) {
        (true, true) => QueryType::Mixed,
        (true, false) => QueryType::Opinion,
        (false, true) => QueryType::Action,
        (false, false) => QueryType::Factual,
    }
}

/// Estimate intent confidence from the query's shape.
pub fn intent_signals(query: &str) -> IntentSignals {
    let words = query.split_whitespace().count();
    let mut confidence: f32 = 0.5;
    if query.trim_end().ends_with('?') {
        confidence += 0.1;
    }
    if INTERROGATIVE_RE.is_match(query) {
        confidence += 0.1;
    }
    if words >= 6 {
        confidence += 0.2;
    }
    IntentSignals { confidence: confidence.min(0.95), ambiguous: words < 3 }
}

/// Does the query likely need fresh external data?
pub fn needs_live_data(query: &str) -> bool {
    LIVE_DATA_RE.is_match(query)
}

/// Time sensitivity uses the same signal as the live-data heuristic.
pub fn is_time_sensitive(query: &str) -> bool {
    needs_live_data(query)
}

/// Flag a topic shift: the new query shares almost no vocabulary with the
/// conversation so far.
pub fn context_drift_high(state: &ConversationState, query: &str) -> bool {
    let prior: Vec<&str> = state
        .messages
        .iter()
        .rev()
        .skip(1) // the query turn itself
        .flat_map(|t| t.text.split_whitespace())
        .collect();
    if prior.len() < 8 {
        return false;
    }
    let prior_words: std::collections::HashSet<String> = prior
        .iter()
        .filter(|w| w.len() >= 4)
        .map(|w| w.to_lowercase())
        .collect();
    let query_words: Vec<String> = query
        .split_whitespace()
        .filter(|w| w.len() >= 4)
        .map(|w| w.to_lowercase())
        .collect();
    if query_words.is_empty() {
        return false;
    }
    let overlap = query_words.iter().filter(|w| prior_words.contains(*w)).count();
    (overlap as f32 / query_words.len() as f32) < 0.15
}

/// Strip filler words, preserving everything else verbatim.
pub fn strip_filler(query: &str) -> String {
    query
        .split_whitespace()
        .filter(|w| {
            let bare = w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            !FILLER_WORDS.contains(&bare.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rough token proxy; good enough for budget checks.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Cost proxy in USD for a prompt of this size.
pub fn estimate_cost_usd(text: &str) -> f64 {
    estimate_tokens(text) as f64 / 1000.0 * 0.01
}

pub fn classify_complexity(query: &str) -> Complexity {
    let words = query.split_whitespace().count();
    if words > 80 || estimate_tokens(query) > 400 {
        Complexity::High
    } else if words > 30 {
        Complexity::Moderate
    } else {
        Complexity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::Turn;

    #[test]
    fn query_type_classification() {
        assert_eq!(classify_query_type("what is the capital of france"), QueryType::Factual);
        assert_eq!(classify_query_type("what do you think of rust"), QueryType::Opinion);
        assert_eq!(classify_query_type("schedule a meeting for monday"), QueryType::Action);
        assert_eq!(
            classify_query_type("what do you think, should we deploy today"),
            QueryType::Mixed
        );
    }

    #[test]
    fn intent_confidence_rises_with_specificity() {
        let vague = intent_signals("fix it");
        let specific = intent_signals("how do I configure retry backoff for the scheduler?");
        assert!(specific.confidence > vague.confidence);
        assert!(vague.ambiguous);
        assert!(!specific.ambiguous);
    }

    #[test]
    fn live_data_keywords_flag_freshness() {
        assert!(needs_live_data("latest bitcoin price"));
        assert!(needs_live_data("what's the weather today"));
        assert!(!needs_live_data("explain ownership in rust"));
    }

    #[test]
    fn drift_requires_prior_context() {
        let mut state = ConversationState::new("c1", "u1");
        state.push_turn(Turn::user("paris"));
        assert!(!context_drift_high(&state, "completely unrelated cooking question"));

        let mut state = ConversationState::new("c1", "u1");
        state.push_turn(Turn::user("tell me about rust lifetimes and borrowing semantics"));
        state.push_turn(Turn::assistant(
            "Lifetimes describe how long references remain valid in rust programs.",
        ));
        state.push_turn(Turn::user("puff pastry techniques"));
        assert!(context_drift_high(&state, "puff pastry techniques"));
        assert!(!context_drift_high(&state, "what about rust references"));
    }

    #[test]
    fn filler_stripping_preserves_content() {
        assert_eq!(
            strip_filler("please just tell me really what this does"),
            "tell me what this does"
        );
    }

    #[test]
    fn complexity_ladder() {
        assert_eq!(classify_complexity("short question"), Complexity::Low);
        let moderate = "word ".repeat(35);
        assert_eq!(classify_complexity(&moderate), Complexity::Moderate);
        let high = "word ".repeat(90);
        assert_eq!(classify_complexity(&high), Complexity::High);
    }
}
