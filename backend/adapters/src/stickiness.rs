//! In-memory stickiness store.
//!
//! Suitable for tests and single-node deployments. Production deployments
//! back `StickinessStore` with a durable external cache so decisions
//! survive process restarts; this implementation honors the same per-entry
//! TTL contract.

use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use moka::sync::Cache;
use moka::Expiry;

use keel_core::{GroundingDecision, StickinessStore};

struct PerEntryTtl;

impl Expiry<String, (GroundingDecision, u64)> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &(GroundingDecision, u64),
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(Duration::from_secs(value.1))
    }
}

pub struct InMemoryStickinessStore {
    cache: Cache<String, (GroundingDecision, u64)>,
}

impl Default for InMemoryStickinessStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStickinessStore {
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

#[async_trait]
impl StickinessStore for InMemoryStickinessStore {
    async fn get(&self, key: &str) -> Result<Option<GroundingDecision>> {
        Ok(self.cache.get(key).map(|(decision, _)| decision))
    }

    async fn set(&self, key: &str, decision: &GroundingDecision, ttl_secs: u64) -> Result<()> {
        self.cache.insert(key.to_string(), (decision.clone(), ttl_secs));
        Ok(())
    }
}
