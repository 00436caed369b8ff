//! Concierge Engine Library
//!
//! This library provides the core functionality of the Concierge engine.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Database persistence module
pub mod db;

/// In-process memory store and per-user locks
pub mod memory;

/// LLM provider abstraction layer (the Completion Port)
pub mod llm;

/// Capability registry and built-in capabilities
pub mod capabilities;

/// Conductor orchestration module
pub mod conductor;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
