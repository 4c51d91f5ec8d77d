//! Mock collaborators with canned behavior, for tests and local demos.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use keel_core::{
    EmbeddingProvider, GenerationBackend, MemoryService, MemorySnapshot, MemoryWrite, ModelHint,
    RetrievalBackend, RetrievedSource, Turn,
};

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

/// Retrieval backend returning a fixed source list, or failing on demand.
#[derive(Default)]
pub struct MockRetrieval {
    sources: Vec<RetrievedSource>,
    failing: bool,
}

impl MockRetrieval {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources(mut self, sources: Vec<RetrievedSource>) -> Self {
        self.sources = sources;
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

#[async_trait]
impl RetrievalBackend for MockRetrieval {
    async fn search(&self, _query: &str, k: usize) -> Result<Vec<RetrievedSource>> {
        if self.failing {
            return Err(anyhow!("retrieval backend offline"));
        }
        Ok(self.sources.iter().take(k).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

/// Deterministic embeddings derived from a SHA-256 of the text. Equal
/// texts embed identically; unrelated texts are very unlikely to clear a
/// similarity threshold.
pub struct MockEmbeddings {
    dimension: usize,
}

impl Default for MockEmbeddings {
    fn default() -> Self {
        Self { dimension: 8 }
    }
}

impl MockEmbeddings {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddings {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let digest = Sha256::digest(text.trim().to_lowercase().as_bytes());
        Ok(digest
            .iter()
            .take(self.dimension)
            .map(|b| (*b as f32 / 255.0) * 2.0 - 1.0)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Generation backend with canned per-tier responses and optional
/// injected failures for the first N calls.
pub struct MockGeneration {
    response: String,
    degraded_response: String,
    fail_remaining: AtomicU32,
    calls: AtomicU32,
}

impl Default for MockGeneration {
    fn default() -> Self {
        Self {
            response: "Mock response".to_string(),
            degraded_response: "Mock degraded response".to_string(),
            fail_remaining: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }
}

impl MockGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = response.into();
        self
    }

    pub fn with_degraded_response(mut self, response: impl Into<String>) -> Self {
        self.degraded_response = response.into();
        self
    }

    /// Fail the first `n` generate calls.
    pub fn failing_times(self, n: u32) -> Self {
        self.fail_remaining.store(n, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for MockGeneration {
    async fn generate(&self, _messages: &[Turn], hint: ModelHint) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("injected generation failure"));
        }
        Ok(match hint {
            ModelHint::Primary => self.response.clone(),
            ModelHint::Degraded => self.degraded_response.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// In-memory memory service recording persisted writes.
pub struct MockMemory {
    snapshot: MemorySnapshot,
    subject_confidence: f32,
    failing_reads: bool,
    writes: Mutex<Vec<MemoryWrite>>,
}

impl Default for MockMemory {
    fn default() -> Self {
        Self {
            snapshot: MemorySnapshot::default(),
            subject_confidence: 1.0,
            failing_reads: false,
            writes: Mutex::new(Vec::new()),
        }
    }
}

impl MockMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preferences(mut self, preferences: Vec<String>) -> Self {
        self.snapshot.preferences = preferences;
        self
    }

    pub fn with_subject_confidence(mut self, confidence: f32) -> Self {
        self.subject_confidence = confidence;
        self
    }

    pub fn failing_reads(mut self) -> Self {
        self.failing_reads = true;
        self
    }

    /// Writes that were actually persisted (prohibited writes are not).
    pub fn persisted_writes(&self) -> Vec<MemoryWrite> {
        self.writes.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl MemoryService for MockMemory {
    async fn read(&self, _user_id: &str) -> Result<MemorySnapshot> {
        if self.failing_reads {
            return Err(anyhow!("memory service offline"));
        }
        Ok(self.snapshot.clone())
    }

    async fn write(&self, write: MemoryWrite) -> Result<()> {
        if write.prohibited {
            return Ok(());
        }
        self.writes.lock().unwrap_or_else(|p| p.into_inner()).push(write);
        Ok(())
    }

    async fn subject_confidence(&self, _conversation_id: &str) -> Result<f32> {
        Ok(self.subject_confidence)
    }
}
