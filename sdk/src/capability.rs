//! Capability trait and invocation context
//!
//! Every pluggable capability (search, weather, greeting, memory, ...) exposes
//! the same `invoke` contract. The engine never knows a capability's concrete
//! type; it only sees `Arc<dyn Capability>` entries in its registry.

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::types::{CapabilityResult, PriorResults};

/// Per-request information handed to every capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityContext {
    /// Session the request belongs to (memory continuity key)
    pub session_id: String,
}

impl CapabilityContext {
    /// Create a context for the given session
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

/// Trait that all capabilities must implement
///
/// # Failure contract
///
/// - `Ok(result)` with `result.success == false` is a declared failure.
/// - `Err(_)` is an internal fault. The engine captures it into a failed
///   `CapabilityResult`; it never aborts the request.
///
/// Later capabilities in a plan receive the results of earlier ones through
/// `prior`. That map is the only channel between capabilities.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Returns the registry name of the capability (e.g. "search")
    fn name(&self) -> &str;

    /// One-line description used when asking a model to plan
    fn description(&self) -> &str;

    /// Run the capability for `input`
    async fn invoke(
        &self,
        ctx: &CapabilityContext,
        input: &str,
        prior: &PriorResults,
    ) -> Result<CapabilityResult, EngineError>;
}
