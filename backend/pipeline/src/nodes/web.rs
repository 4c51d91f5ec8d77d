use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tracing::{debug, warn};

use keel_core::{ConversationState, ScrapedPage, SourceType, Turn};

use crate::orchestrator::Orchestrator;
use crate::router;

/// Per-page cap on the snippet carried into the summary.
const SUMMARY_SNIPPET_CHARS: usize = 280;

impl Orchestrator {
    /// Fetch candidate URLs in bounded batches. Partial failures are fine;
    /// only a total failure marks `scraping_failed`, and even then the
    /// pipeline continues to the gate, which sees the missing evidence.
    pub(crate) async fn web_scraper(&self, state: &mut ConversationState) -> Result<()> {
        let mut urls: Vec<String> = state
            .signals
            .trending
            .as_ref()
            .map(|t| t.candidate_urls.clone())
            .unwrap_or_default();

        // A SearchMore re-entry can arrive without a trending verdict;
        // fall back to a fresh retrieval round for web candidates.
        if urls.is_empty() {
            let query = router::effective_query(state).to_string();
            match self
                .with_timeout("retrieval search", self.retrieval.search(&query, self.config.search_k))
                .await
            {
                Ok(sources) => {
                    urls = sources
                        .into_iter()
                        .filter(|s| s.source_type == SourceType::Web)
                        .map(|s| s.source_id)
                        .collect();
                }
                Err(err) => {
                    warn!(error = %err, "Retrieval for scrape candidates failed");
                    state.record_failure();
                }
            }
        }

        let Some(fetcher) = &self.fetcher else {
            warn!("No web fetcher configured; skipping scrape");
            state.signals.scraping_failed = true;
            return Ok(());
        };

        if urls.is_empty() {
            state.signals.scraping_failed = true;
            return Ok(());
        }

        let concurrency = self.config.fetch_concurrency.max(1);
        let timeout_ms = self.config.node_timeout_ms;
        let mut fetched = Vec::new();
        let chunk_count = urls.chunks(concurrency).count();

        for (batch, chunk) in urls.chunks(concurrency).enumerate() {
            let futures_iter = chunk.iter().map(|url| {
                let fetcher = Arc::clone(fetcher);
                let url = url.clone();
                async move {
                    let outcome =
                        tokio::time::timeout(Duration::from_millis(timeout_ms), fetcher.fetch(&url))
                            .await;
                    (url, outcome)
                }
            });

            for (url, outcome) in join_all(futures_iter).await {
                match outcome {
                    Ok(Ok(content)) if !content.trim().is_empty() => {
                        debug!(%url, bytes = content.len(), "Fetched page");
                        fetched.push(ScrapedPage { url, content });
                    }
                    Ok(Ok(_)) => debug!(%url, "Fetched page was empty"),
                    Ok(Err(err)) => warn!(%url, error = %err, "Fetch failed"),
                    Err(_) => warn!(%url, timeout_ms, "Fetch timed out"),
                }
            }

            if batch + 1 < chunk_count && self.config.fetch_batch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.fetch_batch_delay_ms)).await;
            }
        }

        if fetched.is_empty() {
            warn!(candidates = urls.len(), "All fetches failed; continuing without web evidence");
            state.signals.scraping_failed = true;
            state.record_failure();
        } else {
            state.signals.scraping_failed = false;
            state.signals.scraped_pages.extend(fetched);
        }
        Ok(())
    }

    /// Condense scraped pages into an extractive summary and append it as
    /// a system turn so generation sees the fresh context.
    pub(crate) fn content_summarizer(&self, state: &mut ConversationState) {
        if state.signals.scraped_pages.is_empty() {
            debug!("Nothing to summarize");
            return;
        }

        let summary = state
            .signals
            .scraped_pages
            .iter()
            .map(|page| {
                let snippet: String = page.content.chars().take(SUMMARY_SNIPPET_CHARS).collect();
                format!("{}: {}", page.url, snippet.trim())
            })
            .collect::<Vec<_>>()
            .join("\n");

        state.push_turn(Turn::system(format!("Fresh web context:\n{summary}")));
        state.signals.summary = Some(summary);
    }
}
