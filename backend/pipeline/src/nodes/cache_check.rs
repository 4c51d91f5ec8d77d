use anyhow::Result;
use tracing::{info, warn};

use keel_core::{CacheHitInfo, ConversationState, Turn};

use crate::orchestrator::Orchestrator;
use crate::router;

impl Orchestrator {
    /// Probe the semantic cache for a near-duplicate of the query. A hit
    /// short-circuits the rest of the pipeline (the router sees
    /// `signals.cache_hit`); a lookup error degrades to a miss.
    pub(crate) async fn semantic_cache_check(&self, state: &mut ConversationState) -> Result<()> {
        let query = router::effective_query(state).to_string();
        match self.with_timeout("cache lookup", self.cache.lookup(&query)).await {
            Ok(Some(hit)) => {
                info!(similarity = hit.similarity, "Semantic cache hit; short-circuiting");
                state.signals.cache_hit = Some(CacheHitInfo {
                    similarity: hit.similarity,
                    hit_count: hit.hit_count,
                });
                state.push_turn(Turn::assistant(hit.response.clone()));
                state.signals.response_text = Some(hit.response);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "Cache lookup failed; treating as miss");
                state.record_failure();
            }
        }
        Ok(())
    }
}
