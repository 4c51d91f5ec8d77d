//! Collaborator traits at the runtime's external seams.
//!
//! Everything the orchestrator talks to (retrieval, embeddings,
//! generation, the stickiness store, the memory service, web fetching)
//! sits behind one of these traits so the pipeline can be driven entirely
//! by mocks in tests.

use anyhow::Result;
use async_trait::async_trait;

use crate::context::RetrievedSource;
use crate::decision::GroundingDecision;
use crate::state::Turn;

/// Embedding provider. Implementations are model-specific; consumers only
/// rely on the dimension being stable per provider.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Return the embedding dimension for this provider/model.
    fn dimension(&self) -> usize;

    /// Embed a single text string.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Retrieval backend supplying grounding evidence for a query.
///
/// Callers treat a failed search as an empty result set; the error is for
/// logging, never for aborting the pipeline.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedSource>>;
}

/// Which model tier to generate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelHint {
    Primary,
    /// Cheaper/simpler model used by the recovery path.
    Degraded,
}

impl std::fmt::Display for ModelHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelHint::Primary => write!(f, "primary"),
            ModelHint::Degraded => write!(f, "degraded"),
        }
    }
}

/// The generation backend. Treated as a single opaque capability.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, messages: &[Turn], hint: ModelHint) -> Result<String>;
}

/// Short-TTL decision cache shared across process restarts.
///
/// The gate holds this as an `Option`: absence degrades to evaluating
/// fresh every time, never to an error.
#[async_trait]
pub trait StickinessStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<GroundingDecision>>;
    async fn set(&self, key: &str, decision: &GroundingDecision, ttl_secs: u64) -> Result<()>;
}

/// User memory read result.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    pub preferences: Vec<String>,
    pub insights: Vec<String>,
}

/// A memory persistence request for one completed exchange.
#[derive(Debug, Clone)]
pub struct MemoryWrite {
    pub conversation_id: String,
    pub exchange: Vec<Turn>,
    pub tags: Vec<String>,
    /// When true the write must be a no-op, unconditionally.
    pub prohibited: bool,
}

/// Long-term user memory service.
#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn read(&self, user_id: &str) -> Result<MemorySnapshot>;

    async fn write(&self, write: MemoryWrite) -> Result<()>;

    /// Confidence in [0, 1] that the conversation's subject is tracked
    /// correctly. Low-confidence exchanges must not pollute memory.
    async fn subject_confidence(&self, conversation_id: &str) -> Result<f32>;
}

/// Fetch an external URL and return its content as plain text.
#[async_trait]
pub trait WebFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}
