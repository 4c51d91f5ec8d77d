pub mod context;
pub mod decision;
pub mod error;
pub mod state;
pub mod traits;

pub use context::{
    AgentClass, CacheSignals, GroundingContext, IntentSignals, QueryType, RetrievalSignals,
    RetrievedSource, SourceType,
};
pub use decision::{Decision, GateMetrics, GroundingDecision};
pub use error::KeelError;
pub use state::{
    CacheHitInfo, Complexity, ConversationState, NodeSignals, QualityReport, RiskLevel, Role,
    ScrapedPage, TrendingVerdict, Turn,
};
pub use traits::{
    EmbeddingProvider, GenerationBackend, MemoryService, MemorySnapshot, MemoryWrite, ModelHint,
    RetrievalBackend, StickinessStore, WebFetcher,
};
