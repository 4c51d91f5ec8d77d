//! Stickiness keys.
//!
//! A decision is replayed verbatim for the same `(conversation, query)`
//! within the stickiness window, so a retried request cannot roll the dice
//! for a different outcome. The key must be deterministic across processes.

use sha2::{Digest, Sha256};

/// Normalize a query for keying: lowercase, whitespace collapsed.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// A short stable key over `(conversation_id, normalized query)`.
pub fn stickiness_key(conversation_id: &str, query: &str) -> String {
    let raw = format!("{}|{}", conversation_id, normalize_query(query));
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_case_and_whitespace() {
        assert_eq!(normalize_query("  What IS   rust?  "), "what is rust?");
    }

    #[test]
    fn equivalent_queries_share_a_key() {
        let a = stickiness_key("conv-1", "what is rust?");
        let b = stickiness_key("conv-1", "  What   is RUST? ");
        assert_eq!(a, b);
    }

    #[test]
    fn key_varies_by_conversation_and_query() {
        let base = stickiness_key("conv-1", "what is rust?");
        assert_ne!(base, stickiness_key("conv-2", "what is rust?"));
        assert_ne!(base, stickiness_key("conv-1", "what is go?"));
    }

    #[test]
    fn key_is_sixteen_hex_chars() {
        let key = stickiness_key("conv-1", "q");
        assert_eq!(key.len(), 16);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
