//! Concierge SDK
//!
//! Shared contract between the Concierge engine and pluggable capabilities.
//! A capability implements [`Capability`] and reports a [`CapabilityResult`];
//! memory backends implement [`MemoryStore`].

/// Capability trait and invocation context
pub mod capability;

/// Error types and handling
pub mod errors;

/// Memory store adapter contract
pub mod memory;

/// Capability result types
pub mod types;

// Re-export commonly used types
pub use capability::{Capability, CapabilityContext};
pub use errors::{ConciergeErrorExt, EngineError};
pub use memory::{MemoryRecord, MemoryStore};
pub use types::{CapabilityResult, PriorResults, TIMEOUT_ERROR};
