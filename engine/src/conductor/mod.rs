//! Conductor System
//!
//! Orchestrates recall, the store decision, the clarity check, planning,
//! capability execution and synthesis for one request.

pub mod clarity;
pub mod coordinator;
pub mod executor;
pub mod memory;
pub mod planner;
pub mod synthesizer;
pub mod types;

pub use clarity::ClarityClassifier;
pub use coordinator::Coordinator;
pub use executor::{ExecutionOutcome, Executor};
pub use memory::{RecalledMemory, SessionMemory, StoreDecision};
pub use planner::{validate_plan, Planner};
pub use synthesizer::{Synthesis, Synthesizer};
pub use types::{
    ClarityVerdict, CoordinatorStatus, ExecutionPlan, PipelineState, ResponseEnvelope, Session,
    SynthesisSummary, FALLBACK_RATIONALE,
};
