//! Semantic response cache.
//!
//! An in-memory LRU keyed by embedding similarity: a lookup embeds the
//! query and scans for the closest stored entry, short-circuiting
//! generation for near-duplicate queries. Capacity and TTL limits are
//! enforced independently; a hit refreshes the entry's recency and TTL
//! clock (TTL-renewing read). The embedding model is an injected
//! dependency; the cache is model-agnostic.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::debug;

use keel_config::CacheConfig;
use keel_core::EmbeddingProvider;

use crate::similarity::cosine_similarity;

struct Entry {
    embedding: Vec<f32>,
    response: String,
    created_at: Instant,
    last_used: Instant,
    hit_count: u64,
}

/// A successful cache lookup.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub response: String,
    pub similarity: f32,
    pub hit_count: u64,
}

pub struct SemanticCache {
    config: CacheConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    /// Shared across requests; lock held only for the scan, never across
    /// an await.
    entries: Mutex<Vec<Entry>>,
}

impl SemanticCache {
    pub fn new(config: CacheConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { config, embedder, entries: Mutex::new(Vec::new()) }
    }

    /// Look up a near-duplicate of `query`. A hit increments the entry's
    /// hit counter and refreshes its recency/TTL; the hit/miss outcome
    /// itself is idempotent for repeated lookups.
    pub async fn lookup(&self, query: &str) -> Result<Option<CacheHit>> {
        let embedding = self.embedder.embed(query).await?;

        let mut entries = self.lock_entries();
        let now = Instant::now();
        Self::prune_expired(&mut entries, self.config.ttl_secs, now);

        let threshold = self.config.hit_threshold;
        let mut best: Option<(usize, f32)> = None;
        for (i, entry) in entries.iter().enumerate() {
            let similarity = cosine_similarity(&embedding, &entry.embedding);
            if similarity >= threshold && best.map_or(true, |(_, s)| similarity > s) {
                best = Some((i, similarity));
            }
        }

        let Some((index, similarity)) = best else {
            debug!(query_len = query.len(), "Semantic cache miss");
            return Ok(None);
        };

        let entry = &mut entries[index];
        entry.hit_count += 1;
        entry.created_at = now;
        entry.last_used = now;
        debug!(similarity, hit_count = entry.hit_count, "Semantic cache hit");
        Ok(Some(CacheHit {
            response: entry.response.clone(),
            similarity,
            hit_count: entry.hit_count,
        }))
    }

    /// Store a response under the query's embedding, evicting the
    /// least-recently-used entry when at capacity.
    pub async fn store(&self, query: &str, response: &str) -> Result<()> {
        let embedding = self.embedder.embed(query).await?;

        let mut entries = self.lock_entries();
        let now = Instant::now();
        Self::prune_expired(&mut entries, self.config.ttl_secs, now);

        while entries.len() >= self.config.capacity.max(1) {
            let Some(lru) = entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(i, _)| i)
            else {
                break;
            };
            entries.swap_remove(lru);
        }

        entries.push(Entry {
            embedding,
            response: response.to_string(),
            created_at: now,
            last_used: now,
            hit_count: 0,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn prune_expired(entries: &mut Vec<Entry>, ttl_secs: u64, now: Instant) {
        let ttl = Duration::from_secs(ttl_secs);
        entries.retain(|e| now.duration_since(e.created_at) < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Embedder with fixed vectors per known query.
    struct FixedEmbedder {
        vectors: HashMap<&'static str, Vec<f32>>,
    }

    impl FixedEmbedder {
        fn new() -> Self {
            let mut vectors = HashMap::new();
            vectors.insert("what is rust", vec![1.0, 0.0, 0.0]);
            vectors.insert("what's rust", vec![0.98, 0.199, 0.0]);
            vectors.insert("pasta recipe", vec![0.0, 1.0, 0.0]);
            vectors.insert("moon landing", vec![0.0, 0.0, 1.0]);
            Self { vectors }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn dimension(&self) -> usize {
            3
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(self.vectors.get(text).cloned().unwrap_or_else(|| vec![0.5, 0.5, 0.5]))
        }
    }

    fn cache_with(config: CacheConfig) -> SemanticCache {
        SemanticCache::new(config, Arc::new(FixedEmbedder::new()))
    }

    fn cache() -> SemanticCache {
        cache_with(CacheConfig::default())
    }

    #[tokio::test]
    async fn near_duplicate_query_hits() {
        let cache = cache();
        cache.store("what is rust", "Rust is a systems language.").await.unwrap();

        let hit = cache.lookup("what's rust").await.unwrap().expect("expected a hit");
        assert_eq!(hit.response, "Rust is a systems language.");
        assert!(hit.similarity > 0.95);
        assert_eq!(hit.hit_count, 1);
    }

    #[tokio::test]
    async fn unrelated_query_misses() {
        let cache = cache();
        cache.store("what is rust", "Rust is a systems language.").await.unwrap();
        assert!(cache.lookup("pasta recipe").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repeated_lookup_is_idempotent_on_outcome() {
        let cache = cache();
        cache.store("what is rust", "answer").await.unwrap();

        let first = cache.lookup("what is rust").await.unwrap().expect("hit");
        let second = cache.lookup("what is rust").await.unwrap().expect("hit");
        assert_eq!(first.response, second.response);
        // The hit counter advances, the outcome does not change.
        assert_eq!(second.hit_count, first.hit_count + 1);

        let miss_a = cache.lookup("pasta recipe").await.unwrap();
        let miss_b = cache.lookup("pasta recipe").await.unwrap();
        assert!(miss_a.is_none() && miss_b.is_none());
    }

    #[tokio::test]
    async fn zero_ttl_expires_everything() {
        let cache = cache_with(CacheConfig { ttl_secs: 0, ..Default::default() });
        cache.store("what is rust", "answer").await.unwrap();
        assert!(cache.lookup("what is rust").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let cache = cache_with(CacheConfig { capacity: 2, ..Default::default() });
        cache.store("what is rust", "rust answer").await.unwrap();
        cache.store("pasta recipe", "pasta answer").await.unwrap();

        // Touch the rust entry so the pasta entry is the LRU.
        cache.lookup("what is rust").await.unwrap().expect("hit");

        cache.store("moon landing", "moon answer").await.unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("pasta recipe").await.unwrap().is_none());
        assert!(cache.lookup("what is rust").await.unwrap().is_some());
        assert!(cache.lookup("moon landing").await.unwrap().is_some());
    }
}
