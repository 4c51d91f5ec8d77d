//! The Grounding Confidence Gate.
//!
//! `evaluate` decides whether the system has enough reliable grounding to
//! generate. The surface is infallible: every internal failure collapses
//! to an `AskClarify` fail-safe, never to `Generate`.
//!
//! Evaluation order is normative:
//! stickiness replay → loop protection → hard factual gate → component
//! scoring → domain risk adjustment → ordered decision rules → persist,
//! log, and broadcast.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use keel_config::{GateConfig, RuntimeControls};
use keel_core::{
    AgentClass, Decision, GateMetrics, GroundingContext, GroundingDecision, QueryType,
    StickinessStore,
};

use crate::domain::{classify_domain, RiskDomain};
use crate::scoring::{component_metrics, composite_score};
use crate::stickiness::stickiness_key;

/// Internal event emitted for every fresh decision, for analytics
/// subscribers (threshold tuning, offline evaluation).
#[derive(Debug, Clone)]
pub struct GateEvent {
    pub conversation_id: String,
    pub key: String,
    pub domain: RiskDomain,
    pub decision: GroundingDecision,
    /// True when the decision is computed but not enforced.
    pub shadow: bool,
    pub timestamp: DateTime<Utc>,
}

pub struct GroundingGate {
    controls: Arc<RuntimeControls>,
    /// Absent store degrades to always-evaluate-fresh.
    store: Option<Arc<dyn StickinessStore>>,
    events: broadcast::Sender<GateEvent>,
}

impl GroundingGate {
    pub fn new(controls: Arc<RuntimeControls>, store: Option<Arc<dyn StickinessStore>>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { controls, store, events }
    }

    /// Subscribe to decision events.
    pub fn subscribe(&self) -> broadcast::Receiver<GateEvent> {
        self.events.subscribe()
    }

    /// Evaluate one grounding context into a decision.
    pub async fn evaluate(&self, ctx: &GroundingContext) -> GroundingDecision {
        let config = self.controls.snapshot();

        if config.flags.emergency_bypass {
            warn!(
                conversation_id = %ctx.conversation_id,
                "Emergency bypass active; forcing generation"
            );
            return GroundingDecision::new(
                1.0,
                Decision::Generate,
                vec!["emergency bypass active".to_string()],
                GateMetrics::default(),
            );
        }

        match self.evaluate_inner(ctx, &config).await {
            Ok(decision) => decision,
            Err(err) => {
                error!(
                    conversation_id = %ctx.conversation_id,
                    error = %err,
                    "Gate evaluation failed; failing safe to clarification"
                );
                Self::fail_safe_decision()
            }
        }
    }

    /// The decision produced when evaluation itself breaks. Never Generate.
    pub fn fail_safe_decision() -> GroundingDecision {
        GroundingDecision::new(
            0.0,
            Decision::AskClarify,
            vec!["internal evaluation error".to_string()],
            GateMetrics::default(),
        )
    }

    async fn evaluate_inner(
        &self,
        ctx: &GroundingContext,
        config: &GateConfig,
    ) -> Result<GroundingDecision> {
        let key = stickiness_key(&ctx.conversation_id, &ctx.query);

        // Replay a recent decision for the same (conversation, query) so a
        // retried request cannot get a different outcome by chance.
        if let Some(store) = &self.store {
            match store.get(&key).await {
                Ok(Some(prior)) => {
                    debug!(key = %key, decision = %prior.decision, "Replaying sticky decision");
                    return Ok(prior);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(key = %key, error = %err, "Stickiness read failed; evaluating fresh");
                }
            }
        }

        let domain = classify_domain(&ctx.query);
        let decision = decide(ctx, config, domain);
        self.finish(&key, ctx, &decision, domain, config).await;
        Ok(decision)
    }

    /// Persist, log, and broadcast a fresh decision.
    async fn finish(
        &self,
        key: &str,
        ctx: &GroundingContext,
        decision: &GroundingDecision,
        domain: RiskDomain,
        config: &GateConfig,
    ) {
        if let Some(store) = &self.store {
            if let Err(err) = store.set(key, decision, config.stickiness_ttl_secs).await {
                warn!(key = %key, error = %err, "Stickiness write failed");
            }
        }

        let shadow = config.flags.shadow_mode || !config.flags.blocking_enabled;
        info!(
            target: "gate_decisions",
            conversation_id = %ctx.conversation_id,
            key = %key,
            decision = %decision.decision,
            score = decision.grounding_score,
            retrieval = decision.metrics.retrieval,
            intent = decision.metrics.intent,
            freshness = decision.metrics.freshness,
            diversity = decision.metrics.diversity,
            domain = %domain,
            shadow,
            "Gate decision"
        );

        // No subscribers is fine.
        let _ = self.events.send(GateEvent {
            conversation_id: ctx.conversation_id.clone(),
            key: key.to_string(),
            domain,
            decision: decision.clone(),
            shadow,
            timestamp: Utc::now(),
        });
    }
}

/// Pure decision logic: hard gates, scoring, domain adjustment, and the
/// ordered decision rules (first match wins).
fn decide(ctx: &GroundingContext, config: &GateConfig, domain: RiskDomain) -> GroundingDecision {
    // Loop protection overrides all scoring.
    if ctx.clarification_attempts >= config.max_clarification_attempts {
        return GroundingDecision::new(
            0.0,
            Decision::Refuse,
            vec![format!(
                "Unable to proceed after {} clarification attempts; please start a new question",
                ctx.clarification_attempts
            )],
            GateMetrics::default(),
        );
    }
    if ctx.search_attempts >= config.max_search_attempts {
        return GroundingDecision::new(
            0.0,
            Decision::Refuse,
            vec![format!(
                "Unable to find reliable sources after {} search attempts",
                ctx.search_attempts
            )],
            GateMetrics::default(),
        );
    }

    // Hard factual gate: opinions may be generated ungrounded, facts may not.
    if ctx.retrieval.hit_count == 0 && ctx.query_type != QueryType::Opinion {
        return GroundingDecision::new(
            0.0,
            Decision::Refuse,
            vec!["No relevant information found for this query".to_string()],
            GateMetrics::default(),
        );
    }

    let metrics = component_metrics(ctx);
    let score = composite_score(&metrics, &config.weights);

    let refuse_threshold = config.thresholds.refuse + domain.refuse_threshold_bump();
    let intent_minimum = domain.adjust_intent_minimum(config.thresholds.intent_minimum);

    let mut reasons = Vec::new();
    if domain.is_regulated() {
        reasons.push(format!("{domain} queries require stronger supporting evidence"));
    }

    // (a) Context drift guard.
    if ctx.context_drift_high
        && ctx.intent.confidence < config.thresholds.context_drift_intent_threshold
    {
        reasons.push(
            "The conversation topic appears to have shifted; please restate what you need"
                .to_string(),
        );
        return GroundingDecision::new(score, Decision::AskClarify, reasons, metrics);
    }

    // (b) Composite floor.
    if score < refuse_threshold {
        reasons.push(format!(
            "Grounding score {score:.2} is below the required {refuse_threshold:.2}"
        ));
        return GroundingDecision::new(score, Decision::Refuse, reasons, metrics);
    }

    // (c) Intent floor.
    if ctx.intent.confidence < intent_minimum {
        reasons.push(format!(
            "Intent confidence {:.2} is below {:.2}; a more specific question would help",
            ctx.intent.confidence, intent_minimum
        ));
        return GroundingDecision::new(score, Decision::AskClarify, reasons, metrics);
    }

    // (d) Cost-optimizer agents demand stronger retrieval evidence.
    if ctx.agent_class == AgentClass::CostOptimizer
        && metrics.retrieval < config.thresholds.optimizer_retrieval_minimum
    {
        reasons.push(format!(
            "Retrieval evidence {:.2} is too weak for a cost-optimized answer",
            metrics.retrieval
        ));
        return GroundingDecision::new(score, Decision::AskClarify, reasons, metrics);
    }

    // (e) Stale cached answer for a time-sensitive query.
    let cache_used = ctx.cache.as_ref().is_some_and(|c| c.used);
    if ctx.time_sensitive
        && cache_used
        && metrics.freshness < config.thresholds.cache_minimum_freshness
    {
        reasons.push(
            "Cached answer may be stale for a time-sensitive query; fetching fresher sources"
                .to_string(),
        );
        return GroundingDecision::new(score, Decision::SearchMore, reasons, metrics);
    }

    // (f) User supplied documents but nothing retrieved references them.
    if let Some(ids) = &ctx.document_ids {
        if !ids.is_empty()
            && !ctx.retrieval.sources.iter().any(|s| ids.contains(&s.source_id))
        {
            reasons.push("None of the supplied documents matched this query".to_string());
            return GroundingDecision::new(score, Decision::Refuse, reasons, metrics);
        }
    }

    // (g) Generate.
    reasons.push(format!("Sufficient grounding (score {score:.2})"));
    GroundingDecision::new(score, Decision::Generate, reasons, metrics)
}
