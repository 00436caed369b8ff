//! Conductor data types
//!
//! Everything here is plain serializable data; the envelope in particular is
//! the only artifact handed back to callers.

use crate::llm::router::ProviderHealth;
use sdk::types::CapabilityResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rationale attached to the plan substituted when planning fails
pub const FALLBACK_RATIONALE: &str = "default fallback";

/// Transient per-request view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    /// Plain-text summary of remembered records, if any
    pub recalled_context: Option<String>,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            recalled_context: None,
        }
    }
}

/// Ordered capability names plus the reason they were chosen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub capabilities: Vec<String>,
    pub rationale: String,
}

impl ExecutionPlan {
    /// Plan used whenever planning yields nothing usable
    pub fn fallback(default_plan: &[String]) -> Self {
        let capabilities = if default_plan.is_empty() {
            vec!["search".to_string()]
        } else {
            default_plan.to_vec()
        };
        Self {
            capabilities,
            rationale: FALLBACK_RATIONALE.to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.rationale == FALLBACK_RATIONALE
    }
}

/// Coordinator pipeline states, recorded in order on each envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Start,
    Recall,
    StoreDecision,
    ClarityCheck,
    Clarify,
    Plan,
    Execute,
    Synthesize,
    Done,
    Error,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "START",
            Self::Recall => "RECALL",
            Self::StoreDecision => "STORE_DECISION",
            Self::ClarityCheck => "CLARITY_CHECK",
            Self::Clarify => "CLARIFY",
            Self::Plan => "PLAN",
            Self::Execute => "EXECUTE",
            Self::Synthesize => "SYNTHESIZE",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Clarity classifier output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClarityVerdict {
    NeedMore,
    Proceed,
}

/// Which capabilities produced data and which did not
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl SynthesisSummary {
    pub fn from_results(results: &BTreeMap<String, CapabilityResult>, order: &[String]) -> Self {
        let mut summary = Self::default();
        for name in order {
            match results.get(name) {
                Some(result) if result.success => summary.succeeded.push(name.clone()),
                Some(_) => summary.failed.push(name.clone()),
                None => {}
            }
        }
        summary
    }
}

/// The single artifact returned to any caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    pub session_id: String,
    pub user_input: String,
    /// Absent on the clarification path and when the pipeline failed
    /// before planning
    pub plan: Option<ExecutionPlan>,
    pub results: BTreeMap<String, CapabilityResult>,
    /// Capabilities in the order they actually ran
    #[serde(default)]
    pub execution_order: Vec<String>,
    /// Planned capabilities with no registered handler
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    pub synthesis: String,
    #[serde(default)]
    pub summary: SynthesisSummary,
    pub needs_clarification: bool,
    #[serde(default)]
    pub states: Vec<PipelineState>,
}

impl ResponseEnvelope {
    /// Terminal envelope for the clarification path
    pub fn clarification(
        session_id: &str,
        user_input: &str,
        question: String,
        states: Vec<PipelineState>,
    ) -> Self {
        Self {
            success: true,
            session_id: session_id.to_string(),
            user_input: user_input.to_string(),
            plan: None,
            results: BTreeMap::new(),
            execution_order: Vec::new(),
            skipped: Vec::new(),
            synthesis: question,
            summary: SynthesisSummary::default(),
            needs_clarification: true,
            states,
        }
    }

    /// Envelope for the ERROR state
    pub fn failure(
        session_id: &str,
        user_input: &str,
        error: String,
        states: Vec<PipelineState>,
    ) -> Self {
        Self {
            success: false,
            session_id: session_id.to_string(),
            user_input: user_input.to_string(),
            plan: None,
            results: BTreeMap::new(),
            execution_order: Vec::new(),
            skipped: Vec::new(),
            synthesis: error,
            summary: SynthesisSummary::default(),
            needs_clarification: false,
            states,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Snapshot returned by `Coordinator::status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub capabilities: Vec<String>,
    pub providers: Vec<ProviderHealth>,
    pub memory_backend: String,
    pub default_plan: Vec<String>,
}
