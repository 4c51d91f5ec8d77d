use anyhow::Result;
use tracing::{debug, warn};

use keel_core::{ConversationState, SourceType, TrendingVerdict};

use crate::analysis;
use crate::orchestrator::Orchestrator;
use crate::router;

impl Orchestrator {
    /// Decide whether the query needs fresh external data and collect
    /// candidate URLs for the scraper from web-typed retrieval hits.
    pub(crate) async fn trending_detector(&self, state: &mut ConversationState) -> Result<()> {
        let query = router::effective_query(state).to_string();
        let needs_fresh_data = analysis::needs_live_data(&query);

        let mut verdict = TrendingVerdict {
            needs_fresh_data,
            topics: Vec::new(),
            candidate_urls: Vec::new(),
        };

        if needs_fresh_data {
            verdict.topics = query
                .split_whitespace()
                .filter(|w| w.len() >= 4)
                .take(3)
                .map(|w| w.to_lowercase())
                .collect();

            match self
                .with_timeout("retrieval search", self.retrieval.search(&query, self.config.search_k))
                .await
            {
                Ok(sources) => {
                    verdict.candidate_urls = sources
                        .into_iter()
                        .filter(|s| s.source_type == SourceType::Web)
                        .map(|s| s.source_id)
                        .collect();
                }
                Err(err) => {
                    warn!(error = %err, "Trending URL lookup failed; no scrape candidates");
                    state.record_failure();
                }
            }
        }

        debug!(
            needs_fresh_data,
            candidates = verdict.candidate_urls.len(),
            "Trending verdict"
        );
        state.signals.trending = Some(verdict);
        Ok(())
    }
}
