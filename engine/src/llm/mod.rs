//! LLM Provider Abstraction Layer
//!
//! This module provides the Completion Port: a common interface for sending a
//! prompt to one of several LLM providers (Ollama, OpenAI-compatible,
//! Anthropic) and receiving free text back. The `LLMProvider` trait is the
//! contract every provider implements; `CompletionPort` is what the conductor
//! depends on, and `router::LLMRouter` implements it with failover.
//!
//! Completions are untrusted text. Callers that branch on them must pass the
//! raw output through a strict parser first; the helpers at the bottom of this
//! module exist for that purpose.

use async_trait::async_trait;
use regex::Regex;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod router;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<LLMError> for EngineError {
    fn from(err: LLMError) -> Self {
        EngineError::Completion(err.to_string())
    }
}

/// Message in a prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama", "openai", "anthropic")
    fn name(&self) -> &str;

    /// Returns true if this is a local provider (e.g., Ollama), false for cloud providers
    fn is_local(&self) -> bool;

    /// Returns the estimated cost in USD for the given token count.
    /// Local providers should return 0.0
    fn estimated_cost(&self, tokens: usize) -> f64;

    /// Generate a text completion for the conversation
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Check if the provider is currently healthy and available
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// The Completion Port: "send a prompt, get a text completion".
///
/// Implementors only provide `complete_messages`; the other methods are
/// conveniences built on it. Any `Ok` value is untrusted free text.
#[async_trait]
pub trait CompletionPort: Send + Sync {
    /// Complete a full message list
    async fn complete_messages(&self, messages: &[Message]) -> std::result::Result<String, EngineError>;

    /// Complete a single user prompt
    async fn complete(&self, prompt: &str) -> std::result::Result<String, EngineError> {
        self.complete_messages(&[Message::user(prompt)]).await
    }

    /// Complete a user prompt under a system instruction
    async fn complete_with_system(
        &self,
        system: &str,
        prompt: &str,
    ) -> std::result::Result<String, EngineError> {
        self.complete_messages(&[Message::system(system), Message::user(prompt)])
            .await
    }
}

static THINKING_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Remove `<thinking>...</thinking>` blocks some models emit, then trim.
pub fn strip_thinking(content: &str) -> String {
    let pattern = THINKING_PATTERN
        .get_or_init(|| Regex::new(r"(?s)<thinking>.*?</thinking>").expect("Invalid thinking pattern"));
    pattern.replace_all(content, "").trim().to_string()
}

/// Locate the first JSON object in free text.
///
/// Handles, in order:
/// 1. Raw JSON (the whole content is an object)
/// 2. Fenced JSON (with or without trailing text)
/// 3. An object embedded in prose, found by brace matching
pub fn extract_json_object(content: &str) -> Option<&str> {
    let trimmed = content.trim();

    if trimmed.starts_with('{') && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(trimmed);
    }

    if let Some(inner) = extract_fenced_block(trimmed) {
        let inner = inner.trim();
        if let Some(start) = inner.find('{') {
            if let Some(json) = extract_balanced_json(&inner[start..]) {
                return Some(json);
            }
        }
    }

    let start = trimmed.find('{')?;
    extract_balanced_json(&trimmed[start..])
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
/// Returns `None` if no fenced block is found.
pub fn extract_fenced_block(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
pub fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");

        let system_msg = Message::system("You are a planner");
        assert_eq!(system_msg.role, MessageRole::System);
        assert_eq!(MessageRole::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_llm_error_maps_to_completion_error() {
        let err: EngineError = LLMError::RateLimitExceeded.into();
        assert!(matches!(err, EngineError::Completion(ref m) if m == "Rate limit exceeded"));
    }

    #[test]
    fn test_strip_thinking() {
        let content = "<thinking>\nlet me plan\n</thinking>\n  Paris is sunny.  ";
        assert_eq!(strip_thinking(content), "Paris is sunny.");
        assert_eq!(strip_thinking("no tags"), "no tags");
    }

    #[test]
    fn test_extract_json_object_raw() {
        let content = r#"{"capabilities": ["search"], "rationale": "lookup"}"#;
        assert_eq!(extract_json_object(content), Some(content));
    }

    #[test]
    fn test_extract_json_object_fenced_with_trailing_text() {
        let content = "Here you go:\n```json\n{\"capabilities\": [\"weather\"]}\n```\nEnjoy!";
        assert_eq!(
            extract_json_object(content),
            Some("{\"capabilities\": [\"weather\"]}")
        );
    }

    #[test]
    fn test_extract_json_object_in_prose_with_braces_in_strings() {
        let content = r#"Plan: {"rationale": "use {search}", "capabilities": []} done"#;
        assert_eq!(
            extract_json_object(content),
            Some(r#"{"rationale": "use {search}", "capabilities": []}"#)
        );
    }

    #[test]
    fn test_extract_json_object_none() {
        assert_eq!(extract_json_object("just words"), None);
        assert_eq!(extract_json_object("{ unterminated"), None);
    }
}
