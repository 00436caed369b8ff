//! Error types and handling
//!
//! This module provides the error taxonomy shared by the engine and every
//! pluggable capability. All errors implement the `ConciergeErrorExt` trait
//! which provides user-friendly hints and indicates whether errors are
//! recoverable.
//!
//! # Propagation
//!
//! Only `InvalidInput` is allowed to terminate a request before any output is
//! produced. Every other kind is absorbed at the component boundary where it
//! occurs and turned into a degraded value or a per-capability failure marker.

use thiserror::Error;

/// Trait for Concierge error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait ConciergeErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and never contains secrets
    /// or internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors are degraded or retried inside the pipeline.
    /// Non-recoverable errors must be fixed by the caller.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Input**: the caller violated the non-empty input precondition
/// - **Completion**: model provider or transport fault
/// - **Capability**: an individual capability's internal fault
/// - **Store**: memory adapter fault
/// - **Planning**: the planner produced no usable plan
/// - **Configuration / Database / IO**: application edges
///
/// # Examples
///
/// ```
/// use sdk::errors::{ConciergeErrorExt, EngineError};
///
/// let error = EngineError::Store("disk full".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::InvalidInput("user input is empty".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Capability error in {capability}: {message}")]
    Capability { capability: String, message: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Path canonicalization failed for {0:?}: {1}")]
    PathCanonicalization(std::path::PathBuf, String),

    #[error("Keyring error: {0}")]
    KeyringError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for a capability fault
    pub fn capability(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Capability {
            capability: capability.into(),
            message: message.into(),
        }
    }
}

impl ConciergeErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::InvalidInput(_) => "Enter a non-empty request",
            Self::Completion(_) => "Language model unavailable. Check your provider settings",
            Self::Capability { .. } => "A capability failed. Other results are still reported",
            Self::Store(_) => "Memory store unavailable. The request continues without it",
            Self::Planning(_) => "Planning failed. The default plan was used",
            Self::Timeout(_) => "An operation took too long. Try again",
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Database operation failed. Check the data directory",
            Self::PathCanonicalization(_, _) => "Invalid path specified",
            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidInput(_) | Self::Config(_) | Self::PathCanonicalization(_, _)
        )
    }
}
