//! Component scoring for the grounding gate.
//!
//! Each scorer is a pure function of the grounding context, clamped to
//! [0, 1]. The composite is a weighted sum over the four components with
//! runtime-tunable weights.

use chrono::{Duration, Utc};

use keel_config::GateWeights;
use keel_core::{GateMetrics, GroundingContext, RetrievalSignals};

/// Sources older than this count as stale for time-sensitive queries.
const STALE_SOURCE_AGE_SECS: i64 = 300;

/// Retrieval evidence score.
///
/// 0 with no hits; 0.2 when the best similarity is weak (< 0.6);
/// otherwise the mean similarity with a bonus for broad strong evidence
/// (≥3 hits, best > 0.8), a penalty for a single source, and a bonus when
/// a hit matches a user-supplied document id.
pub fn retrieval_score(retrieval: &RetrievalSignals, document_ids: Option<&[String]>) -> f32 {
    if retrieval.hit_count == 0 {
        return 0.0;
    }
    if retrieval.max_similarity < 0.6 {
        return 0.2;
    }

    let mut score = retrieval.mean_similarity;
    if retrieval.hit_count >= 3 && retrieval.max_similarity > 0.8 {
        score += 0.1;
    }
    if retrieval.hit_count == 1 {
        score *= 0.8;
    }
    if let Some(ids) = document_ids {
        if retrieval.sources.iter().any(|s| ids.iter().any(|id| *id == s.source_id)) {
            score += 0.05;
        }
    }
    score.clamp(0.0, 1.0)
}

/// Intent score: confidence, discounted when the intent is ambiguous.
pub fn intent_score(confidence: f32, ambiguous: bool) -> f32 {
    let score = if ambiguous { confidence * 0.7 } else { confidence };
    score.clamp(0.0, 1.0)
}

/// Freshness score.
///
/// Only time-sensitive queries answered from cache are at risk; everything
/// else is fully fresh. For those, the signal chain is: explicit freshness
/// score, then the cache validity window, then source-timestamp staleness
/// (majority older than 5 minutes ⇒ 0.4), then a conservative 0.3 floor
/// for cached time-sensitive answers with no signal at all.
pub fn freshness_score(ctx: &GroundingContext) -> f32 {
    if !ctx.time_sensitive {
        return 1.0;
    }
    let Some(cache) = &ctx.cache else { return 1.0 };
    if !cache.used {
        return 1.0;
    }

    if let Some(explicit) = cache.freshness_score {
        return explicit.clamp(0.0, 1.0);
    }

    if let Some(valid_until) = cache.valid_until {
        return if valid_until > Utc::now() { 0.8 } else { 0.2 };
    }

    let timestamped = ctx.retrieval.sources.iter().filter_map(|s| s.timestamp).count();
    if timestamped > 0 {
        let cutoff = Utc::now() - Duration::seconds(STALE_SOURCE_AGE_SECS);
        let stale = ctx
            .retrieval
            .sources
            .iter()
            .filter_map(|s| s.timestamp)
            .filter(|ts| *ts < cutoff)
            .count();
        return if stale * 2 > timestamped { 0.4 } else { 0.8 };
    }

    0.3
}

/// Source-diversity score from the number of distinct source types.
pub fn diversity_score(distinct_source_types: usize) -> f32 {
    match distinct_source_types {
        0 => 0.2,
        1 => 0.6,
        2 => 0.8,
        _ => 1.0,
    }
}

/// Compute all four sub-scores for a context.
pub fn component_metrics(ctx: &GroundingContext) -> GateMetrics {
    GateMetrics {
        retrieval: retrieval_score(&ctx.retrieval, ctx.document_ids.as_deref()),
        intent: intent_score(ctx.intent.confidence, ctx.intent.ambiguous),
        freshness: freshness_score(ctx),
        diversity: diversity_score(ctx.retrieval.distinct_source_types()),
    }
}

/// Weighted composite grounding score.
pub fn composite_score(metrics: &GateMetrics, weights: &GateWeights) -> f32 {
    let score = metrics.retrieval * weights.retrieval
        + metrics.intent * weights.intent
        + metrics.freshness * weights.freshness
        + metrics.diversity * weights.diversity;
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keel_core::{CacheSignals, RetrievedSource, SourceType};

    fn source(source_type: SourceType, id: &str, similarity: f32) -> RetrievedSource {
        RetrievedSource {
            source_type,
            source_id: id.to_string(),
            similarity,
            timestamp: None,
            content: String::new(),
        }
    }

    #[test]
    fn no_hits_scores_zero() {
        assert_eq!(retrieval_score(&RetrievalSignals::default(), None), 0.0);
    }

    #[test]
    fn weak_best_similarity_scores_low_floor() {
        let signals = RetrievalSignals::from_sources(vec![
            source(SourceType::Web, "a", 0.55),
            source(SourceType::Web, "b", 0.40),
        ]);
        assert!((retrieval_score(&signals, None) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn strong_broad_evidence_gets_bonus() {
        let signals = RetrievalSignals::from_sources(vec![
            source(SourceType::Web, "a", 0.92),
            source(SourceType::Document, "b", 0.85),
            source(SourceType::Memory, "c", 0.78),
        ]);
        let expected = signals.mean_similarity + 0.1;
        assert!((retrieval_score(&signals, None) - expected).abs() < 1e-6);
    }

    #[test]
    fn single_source_is_penalized() {
        let signals = RetrievalSignals::from_sources(vec![source(SourceType::Web, "a", 0.9)]);
        assert!((retrieval_score(&signals, None) - 0.9 * 0.8).abs() < 1e-6);
    }

    #[test]
    fn user_document_match_gets_bonus() {
        let signals = RetrievalSignals::from_sources(vec![
            source(SourceType::Document, "doc-1", 0.8),
            source(SourceType::Web, "w-1", 0.7),
        ]);
        let ids = vec!["doc-1".to_string()];
        let without = retrieval_score(&signals, None);
        let with = retrieval_score(&signals, Some(&ids));
        assert!((with - without - 0.05).abs() < 1e-6);
    }

    #[test]
    fn ambiguous_intent_is_discounted() {
        assert!((intent_score(0.9, true) - 0.63).abs() < 1e-6);
        assert!((intent_score(0.9, false) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn freshness_is_full_when_not_time_sensitive_or_no_cache() {
        let mut ctx = GroundingContext::new("c", "q");
        ctx.time_sensitive = false;
        assert_eq!(freshness_score(&ctx), 1.0);

        ctx.time_sensitive = true;
        assert_eq!(freshness_score(&ctx), 1.0);

        ctx.cache = Some(CacheSignals { used: false, freshness_score: None, valid_until: None });
        assert_eq!(freshness_score(&ctx), 1.0);
    }

    #[test]
    fn cached_time_sensitive_defaults_conservative() {
        let mut ctx = GroundingContext::new("c", "q");
        ctx.time_sensitive = true;
        ctx.cache = Some(CacheSignals { used: true, freshness_score: None, valid_until: None });
        assert!((freshness_score(&ctx) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn explicit_freshness_signal_wins() {
        let mut ctx = GroundingContext::new("c", "q");
        ctx.time_sensitive = true;
        ctx.cache =
            Some(CacheSignals { used: true, freshness_score: Some(0.65), valid_until: None });
        assert!((freshness_score(&ctx) - 0.65).abs() < 1e-6);
    }

    #[test]
    fn majority_stale_sources_score_low() {
        let old = Utc::now() - chrono::Duration::seconds(600);
        let mut sources = vec![
            source(SourceType::Web, "a", 0.9),
            source(SourceType::Web, "b", 0.9),
            source(SourceType::Web, "c", 0.9),
        ];
        sources[0].timestamp = Some(old);
        sources[1].timestamp = Some(old);
        sources[2].timestamp = Some(Utc::now());

        let mut ctx = GroundingContext::new("c", "q");
        ctx.time_sensitive = true;
        ctx.cache = Some(CacheSignals { used: true, freshness_score: None, valid_until: None });
        ctx.retrieval = RetrievalSignals::from_sources(sources);
        assert!((freshness_score(&ctx) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn diversity_ladder() {
        assert!((diversity_score(0) - 0.2).abs() < 1e-6);
        assert!((diversity_score(1) - 0.6).abs() < 1e-6);
        assert!((diversity_score(2) - 0.8).abs() < 1e-6);
        assert!((diversity_score(3) - 1.0).abs() < 1e-6);
        assert!((diversity_score(5) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn composite_uses_default_weights() {
        let metrics =
            GateMetrics { retrieval: 0.95, intent: 0.9, freshness: 1.0, diversity: 1.0 };
        let score = composite_score(&metrics, &GateWeights::default());
        assert!((score - 0.9575).abs() < 1e-4);
    }
}
