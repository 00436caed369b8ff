//! Orchestration coordinator
//!
//! One request runs START -> RECALL -> STORE_DECISION -> CLARITY_CHECK and
//! then either CLARIFY, or PLAN -> EXECUTE -> SYNTHESIZE, ending in DONE.
//! Every stage except input validation degrades instead of failing; a panic
//! anywhere in the pipeline lands in ERROR and still yields an envelope.

use crate::capabilities::CapabilityRegistry;
use crate::conductor::clarity::ClarityClassifier;
use crate::conductor::executor::Executor;
use crate::conductor::memory::{RecalledMemory, SessionMemory, StoreDecision};
use crate::conductor::planner::Planner;
use crate::conductor::synthesizer::{degraded_text, Synthesizer};
use crate::conductor::types::{
    ClarityVerdict, CoordinatorStatus, ExecutionPlan, PipelineState, ResponseEnvelope, Session,
    SynthesisSummary,
};
use crate::config::{Config, MemoryBackend, PipelineConfig};
use crate::llm::router::LLMRouter;
use crate::llm::{strip_thinking, CompletionPort};
use crate::secrets::scrub_secrets;
use futures::FutureExt;
use sdk::capability::CapabilityContext;
use sdk::errors::EngineError;
use sdk::memory::{MemoryRecord, MemoryStore};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const CLARIFY_SYSTEM_PROMPT: &str =
    "You help users phrase their requests. Ask exactly one short, friendly clarifying question.";

/// Ordered record of the states one request passed through
struct StateTrail<'a> {
    session_id: &'a str,
    states: Mutex<Vec<PipelineState>>,
}

impl<'a> StateTrail<'a> {
    fn new(session_id: &'a str) -> Self {
        Self {
            session_id,
            states: Mutex::new(Vec::new()),
        }
    }

    fn enter(&self, state: PipelineState) {
        info!("[{}] {}", self.session_id, state);
        self.states.lock().unwrap_or_else(|e| e.into_inner()).push(state);
    }

    fn snapshot(&self) -> Vec<PipelineState> {
        self.states.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

pub struct Coordinator {
    port: Arc<dyn CompletionPort>,
    memory: SessionMemory,
    clarity: ClarityClassifier,
    planner: Planner,
    executor: Executor,
    synthesizer: Synthesizer,
    pipeline: PipelineConfig,
    default_plan: Vec<String>,
    memory_backend: MemoryBackend,
    router: Option<Arc<LLMRouter>>,
}

impl Coordinator {
    pub fn new(
        port: Arc<dyn CompletionPort>,
        registry: CapabilityRegistry,
        store: Arc<dyn MemoryStore>,
        config: &Config,
    ) -> Self {
        let default_plan = config.capabilities.default_plan.clone();
        Self {
            memory: SessionMemory::new(
                Arc::clone(&port),
                store,
                config.memory.max_recall_records,
            ),
            clarity: ClarityClassifier::new(Arc::clone(&port)),
            planner: Planner::new(Arc::clone(&port), default_plan.clone()),
            executor: Executor::new(registry, config.capabilities.timeout()),
            synthesizer: Synthesizer::new(Arc::clone(&port)),
            port,
            pipeline: config.pipeline.clone(),
            default_plan,
            memory_backend: config.memory.backend,
            router: None,
        }
    }

    /// Report provider health from `router` in `status`
    pub fn with_router(mut self, router: Arc<LLMRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Run one request/response cycle.
    ///
    /// Returns `Err` only for `EngineError::InvalidInput`; every other fault
    /// is reported inside the envelope.
    pub async fn handle(
        &self,
        user_input: &str,
        session_id: &str,
    ) -> Result<ResponseEnvelope, EngineError> {
        let user_input = user_input.trim();
        if user_input.is_empty() {
            return Err(EngineError::InvalidInput("user input is empty".to_string()));
        }
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(EngineError::InvalidInput("session id is empty".to_string()));
        }

        let trail = StateTrail::new(session_id);
        let run = AssertUnwindSafe(self.run(user_input, session_id, &trail)).catch_unwind();

        match run.await {
            Ok(envelope) => Ok(envelope),
            Err(panic) => {
                let cause = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("[{}] pipeline fault: {}", session_id, cause);
                trail.enter(PipelineState::Error);
                Ok(ResponseEnvelope::failure(
                    session_id,
                    user_input,
                    scrub_secrets(&format!("internal error: {}", cause)),
                    trail.snapshot(),
                ))
            }
        }
    }

    async fn run(&self, user_input: &str, session_id: &str, trail: &StateTrail<'_>) -> ResponseEnvelope {
        trail.enter(PipelineState::Start);
        let mut session = Session::new(session_id);

        trail.enter(PipelineState::Recall);
        let recalled = match self
            .bounded(self.pipeline.recall_timeout_secs, self.memory.recall(session_id))
            .await
        {
            Ok(recalled) => recalled,
            Err(e) => {
                warn!("[{}] recall failed, continuing without context: {}", session_id, e);
                RecalledMemory::default()
            }
        };
        session.recalled_context = recalled.summary.clone();

        trail.enter(PipelineState::StoreDecision);
        self.store_if_worthwhile(&session, user_input, &recalled).await;

        trail.enter(PipelineState::ClarityCheck);
        let verdict = match self
            .bounded(
                self.pipeline.clarity_timeout_secs,
                self.clarity.classify(user_input, session.recalled_context.as_deref()),
            )
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("[{}] clarity check failed, proceeding: {}", session_id, e);
                ClarityVerdict::Proceed
            }
        };

        if verdict == ClarityVerdict::NeedMore {
            trail.enter(PipelineState::Clarify);
            let question = self.clarifying_question(user_input).await;
            trail.enter(PipelineState::Done);
            return ResponseEnvelope::clarification(session_id, user_input, question, trail.snapshot());
        }

        trail.enter(PipelineState::Plan);
        let plan = match self
            .bounded(
                self.pipeline.plan_timeout_secs,
                self.planner.plan(
                    user_input,
                    session.recalled_context.as_deref(),
                    self.executor.registry(),
                ),
            )
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                warn!("[{}] planning failed, using default plan: {}", session_id, e);
                ExecutionPlan::fallback(&self.default_plan)
            }
        };

        trail.enter(PipelineState::Execute);
        let ctx = CapabilityContext::new(session_id);
        let outcome = self.executor.execute(&ctx, &plan, user_input).await;
        if !outcome.skipped.is_empty() {
            warn!("[{}] planned but not registered: {:?}", session_id, outcome.skipped);
        }

        trail.enter(PipelineState::Synthesize);
        let (synthesis, summary) = match self
            .bounded(
                self.pipeline.synthesis_timeout_secs,
                self.synthesizer.synthesize(
                    user_input,
                    &plan.rationale,
                    &outcome.results,
                    &outcome.order,
                ),
            )
            .await
        {
            Ok(synthesis) => (synthesis.text, synthesis.summary),
            Err(e) => {
                warn!("[{}] synthesis failed: {}", session_id, e);
                let summary = SynthesisSummary::from_results(&outcome.results, &outcome.order);
                let text = degraded_text(&outcome.results, &outcome.order, &e.to_string());
                (text, summary)
            }
        };

        trail.enter(PipelineState::Done);
        ResponseEnvelope {
            success: true,
            session_id: session_id.to_string(),
            user_input: user_input.to_string(),
            plan: Some(plan),
            results: outcome.results,
            execution_order: outcome.order,
            skipped: outcome.skipped,
            synthesis,
            summary,
            needs_clarification: false,
            states: trail.snapshot(),
        }
    }

    /// STORE_DECISION: every failure here is logged and ignored
    async fn store_if_worthwhile(&self, session: &Session, user_input: &str, recalled: &RecalledMemory) {
        let session_id = session.session_id.as_str();
        let timeout = self.pipeline.store_decision_timeout_secs;

        let content = match self.bounded(timeout, self.memory.decide_store(user_input, recalled)).await {
            Ok(StoreDecision::Store(content)) => content,
            Ok(StoreDecision::Skip(reason)) => {
                debug!("[{}] not storing input: {}", session_id, reason);
                return;
            }
            Err(e) => {
                warn!("[{}] store decision failed, not storing: {}", session_id, e);
                return;
            }
        };

        match self.bounded(timeout, self.memory.store(session_id, &content)).await {
            Ok(true) => info!("[{}] remembered: {}", session_id, content),
            Ok(false) => warn!("[{}] memory store refused the record", session_id),
            Err(e) => warn!("[{}] memory store failed: {}", session_id, e),
        }
    }

    /// CLARIFY: uses the completion port directly, never the registry
    async fn clarifying_question(&self, user_input: &str) -> String {
        let prompt = format!(
            "The user wrote \"{}\". The request is too ambiguous to answer.\n\
            Ask what they want to know. For example:\n\
            - \"ice coffee\": a recipe, brand recommendations or general information?\n\
            - \"weather\": for which location?\n\
            - \"food\": which food, and what about it?\n\
            Reply with a single short question.",
            user_input
        );

        let reply = self
            .bounded(
                self.pipeline.clarify_timeout_secs,
                self.port.complete_with_system(CLARIFY_SYSTEM_PROMPT, &prompt),
            )
            .await
            .map(|text| strip_thinking(&text));

        match reply {
            Ok(question) if !question.is_empty() => question,
            Ok(_) => default_question(user_input),
            Err(e) => {
                warn!("Clarifying question failed, using default: {}", e);
                default_question(user_input)
            }
        }
    }

    async fn bounded<T, F>(&self, secs: u64, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        tokio::time::timeout(Duration::from_secs(secs), fut)
            .await
            .unwrap_or(Err(EngineError::Timeout(secs)))
    }

    /// Plain-text summary of what is remembered for `session_id`
    pub async fn recall(&self, session_id: &str) -> Result<Option<String>, EngineError> {
        Ok(self.memory.recall(session_id).await?.summary)
    }

    pub async fn list_memories(&self, session_id: &str) -> Result<Vec<MemoryRecord>, EngineError> {
        self.memory.store_adapter().list(session_id).await
    }

    /// Forget everything stored for `session_id`, returning the count
    pub async fn clear_memories(&self, session_id: &str) -> Result<usize, EngineError> {
        let deleted = self.memory.store_adapter().clear(session_id).await?;
        info!("[{}] cleared {} memories", session_id, deleted);
        Ok(deleted)
    }

    pub async fn status(&self) -> CoordinatorStatus {
        let providers = match &self.router {
            Some(router) => router.check_health().await,
            None => Vec::new(),
        };
        CoordinatorStatus {
            capabilities: self.executor.registry().names(),
            providers,
            memory_backend: match self.memory_backend {
                MemoryBackend::Sqlite => "sqlite".to_string(),
                MemoryBackend::Memory => "memory".to_string(),
            },
            default_plan: self.default_plan.clone(),
        }
    }
}

fn default_question(user_input: &str) -> String {
    format!("Could you tell me a bit more about what you'd like to know about \"{}\"?", user_input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use crate::memory::InMemoryStore;
    use async_trait::async_trait;

    /// Port that panics on any use
    struct Exploding;

    #[async_trait]
    impl CompletionPort for Exploding {
        async fn complete_messages(&self, _messages: &[Message]) -> Result<String, EngineError> {
            panic!("port exploded")
        }
    }

    /// Port that is always offline
    struct Offline;

    #[async_trait]
    impl CompletionPort for Offline {
        async fn complete_messages(&self, _messages: &[Message]) -> Result<String, EngineError> {
            Err(EngineError::Completion("offline".to_string()))
        }
    }

    fn coordinator(port: Arc<dyn CompletionPort>) -> Coordinator {
        Coordinator::new(
            port,
            CapabilityRegistry::new(),
            Arc::new(InMemoryStore::new()),
            &Config::default(),
        )
    }

    #[tokio::test]
    async fn test_blank_input_is_rejected() {
        let coordinator = coordinator(Arc::new(Offline));
        for input in ["", "   ", "\n\t"] {
            let err = coordinator.handle(input, "s").await.unwrap_err();
            assert!(matches!(err, EngineError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn test_panic_becomes_error_envelope() {
        let envelope = coordinator(Arc::new(Exploding)).handle("hello", "s").await.unwrap();
        assert!(!envelope.success);
        assert!(envelope.synthesis.contains("port exploded"));
        assert_eq!(envelope.states.last(), Some(&PipelineState::Error));
    }

    #[tokio::test]
    async fn test_offline_port_degrades_everywhere() {
        let envelope = coordinator(Arc::new(Offline)).handle("tell me about Rust", "s").await.unwrap();

        assert!(envelope.success);
        assert!(!envelope.needs_clarification);
        assert!(envelope.plan.as_ref().unwrap().is_fallback());
        // Nothing registered, so nothing ran and nothing could be summarised
        assert!(envelope.results.is_empty());
        assert!(envelope.synthesis.starts_with("synthesis error: "));
        assert_eq!(
            envelope.states,
            vec![
                PipelineState::Start,
                PipelineState::Recall,
                PipelineState::StoreDecision,
                PipelineState::ClarityCheck,
                PipelineState::Plan,
                PipelineState::Execute,
                PipelineState::Synthesize,
                PipelineState::Done,
            ]
        );
    }
}
