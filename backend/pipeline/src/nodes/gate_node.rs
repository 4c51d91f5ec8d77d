use anyhow::Result;
use chrono::Utc;
use tracing::{debug, warn};

use keel_cache::cosine_similarity;
use keel_core::{
    AgentClass, ConversationState, Decision, GroundingContext, RetrievalSignals, RetrievedSource,
    SourceType,
};

use crate::analysis;
use crate::options::{ChatMode, ProcessOptions};
use crate::orchestrator::Orchestrator;
use crate::router;

/// Per-page cap on the snippet scored as web evidence.
const EVIDENCE_SNIPPET_CHARS: usize = 512;

impl Orchestrator {
    /// Assemble the grounding context and run the gate. The decision and
    /// its memory-write prohibition are written back to the state; a
    /// SearchMore decision bumps the loop-protection counter here, since
    /// this node is the only SearchMore issuer.
    pub(crate) async fn grounding_gate_node(
        &self,
        state: &mut ConversationState,
        options: &ProcessOptions,
    ) -> Result<()> {
        let ctx = self.build_grounding_context(state, options).await;
        let decision = self.gate.evaluate(&ctx).await;
        debug!(decision = %decision.decision, score = decision.grounding_score, "Gate decided");

        if decision.decision == Decision::SearchMore {
            state.search_attempts += 1;
        }
        state.prohibit_memory_write = decision.prohibit_memory_write;
        state.grounding_decision = Some(decision);
        Ok(())
    }

    /// Build the gate's read-only view: retrieval evidence (degraded to
    /// empty on adapter failure) plus any scraped pages scored against the
    /// query embedding.
    pub(crate) async fn build_grounding_context(
        &self,
        state: &mut ConversationState,
        options: &ProcessOptions,
    ) -> GroundingContext {
        let query = router::effective_query(state).to_string();

        let mut sources = match self
            .with_timeout("retrieval search", self.retrieval.search(&query, self.config.search_k))
            .await
        {
            Ok(sources) => sources,
            Err(err) => {
                warn!(error = %err, "Retrieval failed; evaluating with empty evidence");
                state.record_failure();
                Vec::new()
            }
        };

        if !state.signals.scraped_pages.is_empty() {
            match self.with_timeout("embed query", self.embedder.embed(&query)).await {
                Ok(query_vec) => {
                    for page in &state.signals.scraped_pages {
                        let snippet: String =
                            page.content.chars().take(EVIDENCE_SNIPPET_CHARS).collect();
                        match self.with_timeout("embed page", self.embedder.embed(&snippet)).await {
                            Ok(page_vec) => sources.push(RetrievedSource {
                                source_type: SourceType::Web,
                                source_id: page.url.clone(),
                                similarity: cosine_similarity(&query_vec, &page_vec).max(0.0),
                                timestamp: Some(Utc::now()),
                                content: snippet,
                            }),
                            Err(err) => {
                                warn!(url = %page.url, error = %err, "Page embedding failed")
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, "Query embedding failed; scraped pages not scored")
                }
            }
        }

        GroundingContext {
            conversation_id: state.conversation_id.clone(),
            query_type: analysis::classify_query_type(&query),
            intent: analysis::intent_signals(&query),
            time_sensitive: analysis::is_time_sensitive(&query),
            context_drift_high: analysis::context_drift_high(state, &query),
            retrieval: RetrievalSignals::from_sources(sources),
            // Never populated on this path: a semantic-cache hit ends the
            // run before the gate, and retrieval adapters carry no cache
            // metadata. Callers evaluating the gate directly against
            // cache-served context supply `CacheSignals` themselves.
            cache: None,
            document_ids: (!options.document_ids.is_empty())
                .then(|| options.document_ids.clone()),
            agent_class: if options.chat_mode == ChatMode::Cheapest {
                AgentClass::CostOptimizer
            } else {
                AgentClass::Standard
            },
            clarification_attempts: state.clarification_attempts,
            search_attempts: state.search_attempts,
            query,
        }
    }
}
