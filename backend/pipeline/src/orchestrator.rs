//! The orchestration loop: run a node, route, repeat until a terminal.
//!
//! All collaborators sit behind the core traits so the whole machine runs
//! against mocks in tests. Node handlers live in `nodes/`; routing is the
//! pure function in `router.rs`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, instrument, warn};

use keel_cache::SemanticCache;
use keel_config::{PipelineConfig, RuntimeControls};
use keel_core::{
    ConversationState, EmbeddingProvider, GenerationBackend, KeelError, MemoryService,
    RetrievalBackend, Turn, WebFetcher,
};
use keel_gate::GroundingGate;
use keel_recovery::{RecoveryPolicy, APOLOGY_MESSAGE};

use crate::node::NodeId;
use crate::options::{ProcessOptions, ProcessRequest};
use crate::result::{FinalResult, Outcome};
use crate::router::{next_node, RouteContext};

/// Hard bound on node executions per request. The graph's only cycles are
/// the gate's SearchMore loop and the generation retry loop, both capped,
/// so hitting this means a routing bug.
const MAX_STEPS: usize = 32;

pub struct Orchestrator {
    pub(crate) controls: Arc<RuntimeControls>,
    pub(crate) config: PipelineConfig,
    pub(crate) gate: Arc<GroundingGate>,
    pub(crate) cache: Arc<SemanticCache>,
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) retrieval: Arc<dyn RetrievalBackend>,
    pub(crate) generation: Arc<dyn GenerationBackend>,
    pub(crate) memory: Arc<dyn MemoryService>,
    /// Absent fetcher degrades the scraper to a no-op with
    /// `scraping_failed` set.
    pub(crate) fetcher: Option<Arc<dyn WebFetcher>>,
    pub(crate) recovery: RecoveryPolicy,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        controls: Arc<RuntimeControls>,
        gate: Arc<GroundingGate>,
        cache: Arc<SemanticCache>,
        embedder: Arc<dyn EmbeddingProvider>,
        retrieval: Arc<dyn RetrievalBackend>,
        generation: Arc<dyn GenerationBackend>,
        memory: Arc<dyn MemoryService>,
    ) -> Self {
        Self {
            controls,
            config: PipelineConfig::default(),
            gate,
            cache,
            embedder,
            retrieval,
            generation,
            memory,
            fetcher: None,
            recovery: RecoveryPolicy::default(),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn WebFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_recovery_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.recovery = policy;
        self
    }

    /// Run one request through the state machine to a terminal node.
    ///
    /// Cancellation is checked between nodes: a cancelled token stops the
    /// run after the currently executing node, before any memory write.
    #[instrument(skip_all, fields(conversation_id = %request.conversation_id))]
    pub async fn process(&self, request: ProcessRequest) -> Result<FinalResult, KeelError> {
        let options = request.options;

        let mut state = ConversationState::new(&request.conversation_id, &request.user_id);
        for turn in &options.prior_messages {
            state.push_turn(turn.clone());
        }
        state.push_turn(Turn::user(&request.query));
        state.signals.document_ids = options.document_ids.clone();

        let mut node = NodeId::MemoryReader;
        let mut terminal = None;

        for _ in 0..MAX_STEPS {
            if options.cancellation.is_cancelled() {
                info!(node = %node, "Request cancelled; stopping before next node");
                return Err(KeelError::Cancelled);
            }

            state.visit(node.as_str());
            debug!(node = %node, "Running node");
            if let Err(err) = self.run_node(node, &mut state, &options).await {
                warn!(node = %node, error = %err, "Node failed");
                state.record_failure();
            }

            if node.is_terminal() {
                terminal = Some(node);
                break;
            }

            let snapshot = self.controls.snapshot();
            let route = RouteContext {
                flags: snapshot.flags,
                chat_mode: options.chat_mode,
                max_failures: self.config.max_failures,
            };
            let next = next_node(node, &state, &route);
            if next == NodeId::End {
                state.visit(NodeId::End.as_str());
                terminal = Some(NodeId::End);
                break;
            }
            node = next;
        }

        let terminal = match terminal {
            Some(terminal) => terminal,
            None => {
                // A routing bug, not a user problem. Fail toward
                // clarification, never generation.
                error!(steps = MAX_STEPS, "Step budget exhausted without a terminal");
                state.visit(NodeId::ClarificationNeeded.as_str());
                self.clarification_needed(&mut state);
                NodeId::ClarificationNeeded
            }
        };

        let outcome = if state.signals.cache_hit.is_some() {
            Outcome::CacheHit
        } else {
            match terminal {
                NodeId::ClarificationNeeded => Outcome::Clarification,
                NodeId::RefuseSafely => Outcome::Refusal,
                NodeId::FailureRecovery => Outcome::Recovered,
                _ => Outcome::Completed,
            }
        };

        let response = state
            .signals
            .response_text
            .clone()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| APOLOGY_MESSAGE.to_string());

        info!(
            outcome = ?outcome,
            failure_count = state.failure_count,
            path = state.agent_path.join(" -> "),
            "Request finished"
        );
        Ok(FinalResult {
            response,
            outcome,
            agent_path: state.agent_path,
            decision: state.grounding_decision,
            failure_count: state.failure_count,
        })
    }

    async fn run_node(
        &self,
        node: NodeId,
        state: &mut ConversationState,
        options: &ProcessOptions,
    ) -> Result<()> {
        match node {
            NodeId::MemoryReader => self.memory_reader(state).await,
            NodeId::PromptAnalyzer => {
                self.prompt_analyzer(state, options);
                Ok(())
            }
            NodeId::TrendingDetector => self.trending_detector(state).await,
            NodeId::WebScraper => self.web_scraper(state).await,
            NodeId::ContentSummarizer => {
                self.content_summarizer(state);
                Ok(())
            }
            NodeId::SemanticCache => self.semantic_cache_check(state).await,
            NodeId::GroundingGate => self.grounding_gate_node(state, options).await,
            NodeId::ClarificationNeeded => {
                self.clarification_needed(state);
                Ok(())
            }
            NodeId::RefuseSafely => {
                self.refuse_safely(state);
                Ok(())
            }
            NodeId::MasterAgent => self.master_agent(state, options).await,
            NodeId::CostOptimizer => {
                self.cost_optimizer(state, options);
                Ok(())
            }
            NodeId::QualityAnalyst => {
                self.quality_analyst(state);
                Ok(())
            }
            NodeId::MemoryWriter => self.memory_writer(state).await,
            NodeId::FailureRecovery => self.failure_recovery(state).await,
            NodeId::End => Ok(()),
        }
    }

    /// Apply the per-call timeout to an external call. Deadline overruns
    /// surface as `KeelError::Timeout` so callers can tell them apart
    /// from adapter errors.
    pub(crate) async fn with_timeout<T, F>(&self, label: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(Duration::from_millis(self.config.node_timeout_ms), call).await
        {
            Ok(result) => result,
            Err(_) => Err(KeelError::Timeout(format!(
                "{label} after {}ms",
                self.config.node_timeout_ms
            ))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use keel_adapters::{MockEmbeddings, MockGeneration, MockMemory, MockRetrieval};
    use keel_config::CacheConfig;
    use keel_core::{Decision, RetrievedSource, SourceType};

    use crate::options::ChatMode;

    struct Rig {
        controls: Arc<RuntimeControls>,
        cache: Arc<SemanticCache>,
        generation: Arc<MockGeneration>,
        memory: Arc<MockMemory>,
        orchestrator: Orchestrator,
    }

    fn rig(retrieval: MockRetrieval, generation: MockGeneration) -> Rig {
        rig_with_memory(retrieval, generation, MockMemory::new())
    }

    fn rig_with_memory(
        retrieval: MockRetrieval,
        generation: MockGeneration,
        memory: MockMemory,
    ) -> Rig {
        let controls = Arc::new(RuntimeControls::default());
        let embedder = Arc::new(MockEmbeddings::new());
        let cache = Arc::new(SemanticCache::new(CacheConfig::default(), embedder.clone()));
        let gate = Arc::new(GroundingGate::new(controls.clone(), None));
        let generation = Arc::new(generation);
        let memory = Arc::new(memory);
        let orchestrator = Orchestrator::new(
            controls.clone(),
            gate,
            cache.clone(),
            embedder,
            Arc::new(retrieval),
            generation.clone(),
            memory.clone(),
        );
        Rig { controls, cache, generation, memory, orchestrator }
    }

    fn source(source_type: SourceType, id: &str, similarity: f32) -> RetrievedSource {
        RetrievedSource {
            source_type,
            source_id: id.to_string(),
            similarity,
            timestamp: None,
            content: String::new(),
        }
    }

    fn strong_sources() -> Vec<RetrievedSource> {
        vec![
            source(SourceType::Document, "d-1", 0.92),
            source(SourceType::Web, "w-1", 0.88),
            source(SourceType::Memory, "m-1", 0.83),
        ]
    }

    #[tokio::test]
    async fn well_grounded_query_generates_and_persists() {
        let rig = rig(
            MockRetrieval::new().with_sources(strong_sources()),
            MockGeneration::new().with_response("Paris is the capital of France."),
        );

        let result = rig
            .orchestrator
            .process(ProcessRequest::new("c1", "u1", "what is the capital city of france"))
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Completed);
        assert_eq!(result.response, "Paris is the capital of France.");
        assert_eq!(
            result.decision.as_ref().map(|d| d.decision),
            Some(Decision::Generate)
        );
        assert!(result.agent_path.contains(&"master_agent".to_string()));
        assert!(result.agent_path.contains(&"quality_analyst".to_string()));
        assert_eq!(rig.memory.persisted_writes().len(), 1);
        // The answer is now cached for near-duplicate queries.
        assert_eq!(rig.cache.len(), 1);
    }

    #[tokio::test]
    async fn ungrounded_factual_query_refuses_when_strict() {
        let rig = rig(MockRetrieval::new(), MockGeneration::new());
        rig.controls
            .update(|c| c.flags.strict_refusal = true)
            .unwrap();

        let result = rig
            .orchestrator
            .process(ProcessRequest::new("c1", "u1", "what is the capital city of france"))
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Refusal);
        assert!(result.response.contains("No relevant information"));
        assert_eq!(rig.generation.call_count(), 0);
        assert!(rig.memory.persisted_writes().is_empty());
    }

    #[tokio::test]
    async fn soft_refusal_generates_but_never_persists() {
        // Default flags: Refuse degrades to generation with a warning, but
        // the memory-write prohibition survives.
        let rig = rig(
            MockRetrieval::new(),
            MockGeneration::new().with_response("A best-effort answer."),
        );

        let result = rig
            .orchestrator
            .process(ProcessRequest::new("c1", "u1", "what is the capital city of france"))
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Completed);
        assert_eq!(result.response, "A best-effort answer.");
        assert_eq!(
            result.decision.as_ref().map(|d| d.decision),
            Some(Decision::Refuse)
        );
        assert!(rig.memory.persisted_writes().is_empty());
        // Degraded answers must not poison the cache either.
        assert_eq!(rig.cache.len(), 0);
    }

    #[tokio::test]
    async fn soft_refusal_retries_a_transient_generation_failure() {
        // The degraded-to-generation Refuse stays in state; one failed
        // generation attempt must retry toward the cap, not get the
        // unenforced decision applied after the fact.
        let rig = rig(
            MockRetrieval::new(),
            MockGeneration::new()
                .with_response("A best-effort answer.")
                .failing_times(1),
        );

        let result = rig
            .orchestrator
            .process(ProcessRequest::new("c1", "u1", "what is the capital city of france"))
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Completed);
        assert_eq!(result.response, "A best-effort answer.");
        assert_eq!(result.failure_count, 1);
        assert_eq!(rig.generation.call_count(), 2);
        assert!(!result.agent_path.contains(&"refuse_safely".to_string()));
        assert!(rig.memory.persisted_writes().is_empty());
    }

    #[tokio::test]
    async fn vague_query_terminates_asking_for_clarification() {
        let rig = rig(
            MockRetrieval::new().with_sources(strong_sources()),
            MockGeneration::new(),
        );

        let result = rig
            .orchestrator
            .process(ProcessRequest::new("c1", "u1", "tell me stuff"))
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Clarification);
        assert!(result.response.contains("more detail"));
        assert!(result.agent_path.contains(&"clarification_needed".to_string()));
        assert_eq!(rig.generation.call_count(), 0);
        assert!(rig.memory.persisted_writes().is_empty());
    }

    #[tokio::test]
    async fn near_duplicate_query_short_circuits_through_the_cache() {
        let rig = rig(
            MockRetrieval::new().with_sources(strong_sources()),
            MockGeneration::new(),
        );
        rig.cache
            .store("what is the capital city of france", "Paris, from cache.")
            .await
            .unwrap();

        let result = rig
            .orchestrator
            .process(ProcessRequest::new("c1", "u1", "what is the capital city of france"))
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::CacheHit);
        assert_eq!(result.response, "Paris, from cache.");
        assert_eq!(rig.generation.call_count(), 0);
        assert!(!result.agent_path.contains(&"grounding_gate".to_string()));
        assert!(rig.memory.persisted_writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_generation_failures_recover_on_the_degraded_model() {
        let rig = rig(
            MockRetrieval::new().with_sources(strong_sources()),
            MockGeneration::new()
                .with_degraded_response("Short answer from the fallback model.")
                .failing_times(3),
        );

        let result = rig
            .orchestrator
            .process(ProcessRequest::new("c1", "u1", "what is the capital city of france"))
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Recovered);
        assert_eq!(result.response, "Short answer from the fallback model.");
        assert_eq!(result.failure_count, 3);
        // Three primary attempts plus the degraded one.
        assert_eq!(rig.generation.call_count(), 4);
        assert!(rig.memory.persisted_writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn total_generation_failure_falls_back_to_the_apology() {
        let rig = rig(
            MockRetrieval::new().with_sources(strong_sources()),
            MockGeneration::new().failing_times(10),
        );

        let result = rig
            .orchestrator
            .process(ProcessRequest::new("c1", "u1", "what is the capital city of france"))
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Recovered);
        assert_eq!(result.response, APOLOGY_MESSAGE);
    }

    #[tokio::test]
    async fn cancelled_request_stops_before_any_work() {
        let rig = rig(
            MockRetrieval::new().with_sources(strong_sources()),
            MockGeneration::new(),
        );
        let options = ProcessOptions::default();
        options.cancellation.cancel();

        let err = rig
            .orchestrator
            .process(
                ProcessRequest::new("c1", "u1", "what is the capital city of france")
                    .with_options(options),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, KeelError::Cancelled));
        assert_eq!(rig.generation.call_count(), 0);
        assert!(rig.memory.persisted_writes().is_empty());
    }

    #[tokio::test]
    async fn supplied_documents_outrank_live_data_lookup() {
        let rig = rig(
            MockRetrieval::new().with_sources(vec![
                source(SourceType::Document, "doc-1", 0.9),
                source(SourceType::Web, "w-1", 0.85),
                source(SourceType::Memory, "m-1", 0.8),
            ]),
            MockGeneration::new().with_response("Your report shows growth."),
        );
        let options = ProcessOptions {
            document_ids: vec!["doc-1".to_string()],
            ..ProcessOptions::default()
        };

        let result = rig
            .orchestrator
            .process(
                ProcessRequest::new(
                    "c1",
                    "u1",
                    "what are the latest quarterly numbers in my report",
                )
                .with_options(options),
            )
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Completed);
        // Document analysis, not a news check: no trending or scraping.
        assert!(!result.agent_path.contains(&"trending_detector".to_string()));
        assert!(!result.agent_path.contains(&"web_scraper".to_string()));
        assert_eq!(
            result.decision.as_ref().map(|d| d.decision),
            Some(Decision::Generate)
        );
        assert_eq!(rig.memory.persisted_writes().len(), 1);
    }

    #[tokio::test]
    async fn scraping_failure_still_reaches_the_gate_and_generates() {
        // No fetcher configured, so every scrape attempt fails; the run
        // must continue on retrieval evidence alone.
        let rig = rig(
            MockRetrieval::new().with_sources(vec![
                source(SourceType::Web, "https://example.com/a", 0.9),
                source(SourceType::Document, "d-1", 0.85),
                source(SourceType::Memory, "m-1", 0.8),
            ]),
            MockGeneration::new().with_response("The newest release is out."),
        );

        let result = rig
            .orchestrator
            .process(ProcessRequest::new(
                "c1",
                "u1",
                "what is the latest rust release version today",
            ))
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Completed);
        assert!(result.agent_path.contains(&"web_scraper".to_string()));
        assert!(result.agent_path.contains(&"content_summarizer".to_string()));
        assert!(result.agent_path.contains(&"master_agent".to_string()));
        assert_eq!(rig.memory.persisted_writes().len(), 1);
    }

    #[tokio::test]
    async fn fastest_mode_skips_post_processing() {
        let rig = rig(
            MockRetrieval::new().with_sources(strong_sources()),
            MockGeneration::new().with_response("Quick answer."),
        );
        let options = ProcessOptions { chat_mode: ChatMode::Fastest, ..ProcessOptions::default() };

        let result = rig
            .orchestrator
            .process(
                ProcessRequest::new("c1", "u1", "what is the capital city of france")
                    .with_options(options),
            )
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Completed);
        assert!(!result.agent_path.contains(&"cost_optimizer".to_string()));
        assert!(!result.agent_path.contains(&"quality_analyst".to_string()));
        assert!(result.agent_path.contains(&"memory_writer".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_overruns_surface_as_typed_timeouts() {
        let rig = rig(MockRetrieval::new(), MockGeneration::new());

        let err = rig
            .orchestrator
            .with_timeout("stalled call", futures::future::pending::<anyhow::Result<()>>())
            .await
            .unwrap_err();

        match err.downcast_ref::<KeelError>() {
            Some(KeelError::Timeout(detail)) => assert!(detail.contains("stalled call")),
            other => panic!("expected a timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn low_subject_confidence_skips_the_memory_write() {
        let rig = rig_with_memory(
            MockRetrieval::new().with_sources(strong_sources()),
            MockGeneration::new().with_response("An answer."),
            MockMemory::new().with_subject_confidence(0.2),
        );

        let result = rig
            .orchestrator
            .process(ProcessRequest::new("c1", "u1", "what is the capital city of france"))
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Completed);
        assert!(result.agent_path.contains(&"memory_writer".to_string()));
        assert!(rig.memory.persisted_writes().is_empty());
    }
}
