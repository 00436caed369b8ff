//! LLM Router
//!
//! Selects which LLM provider answers a completion based on prompt
//! characteristics. The router analyzes sensitivity, complexity, and token
//! requirements to rank providers, then walks the ranking with a per-provider
//! timeout. It is the engine's `CompletionPort`.

use super::{strip_thinking, CompletionPort, LLMError, LLMProvider, Message};
use crate::config::LLMConfig;
use async_trait::async_trait;
use sdk::errors::EngineError;
use std::sync::Arc;
use std::time::Duration;

/// Task profile used for provider ranking
#[derive(Debug, Clone)]
pub struct TaskProfile {
    /// Sensitivity score (0.0-1.0)
    /// Higher values indicate more sensitive data
    pub sensitivity: f64,

    /// Complexity score (0.0-1.0)
    pub complexity: f64,

    /// Estimated token count for the prompt
    pub estimated_tokens: usize,
}

impl TaskProfile {
    pub fn new(sensitivity: f64, complexity: f64, estimated_tokens: usize) -> Self {
        Self {
            sensitivity: sensitivity.clamp(0.0, 1.0),
            complexity: complexity.clamp(0.0, 1.0),
            estimated_tokens,
        }
    }
}

/// Health of one provider, as reported by `check_health`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProviderHealth {
    pub name: String,
    pub local: bool,
    pub healthy: bool,
}

/// LLM Router that selects appropriate providers based on prompt characteristics
pub struct LLMRouter {
    providers: Vec<Box<dyn LLMProvider>>,
    config: Arc<LLMConfig>,
}

impl LLMRouter {
    pub fn new(providers: Vec<Box<dyn LLMProvider>>, config: Arc<LLMConfig>) -> Self {
        Self { providers, config }
    }

    /// Names of the configured providers, in registration order
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Analyze a message list into a ranking profile
    pub fn analyze_task(&self, messages: &[Message]) -> TaskProfile {
        TaskProfile::new(
            self.calculate_sensitivity(messages),
            self.calculate_complexity(messages),
            self.estimate_tokens(messages),
        )
    }

    /// Keyword scan for credentials and personal data.
    /// Each distinct keyword adds 0.2, capped at 1.0.
    fn calculate_sensitivity(&self, messages: &[Message]) -> f64 {
        const SENSITIVE_KEYWORDS: &[&str] = &[
            "password",
            "credential",
            "secret",
            "token",
            "api_key",
            "private_key",
            "ssn",
            "credit_card",
            "bank",
            "account",
            "address",
            "phone",
        ];

        let total_content: String = messages
            .iter()
            .map(|m| m.content.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        let hits = SENSITIVE_KEYWORDS
            .iter()
            .filter(|keyword| total_content.contains(*keyword))
            .count();

        (hits as f64 * 0.2).min(1.0)
    }

    /// Message count, average length and structured content (code fences,
    /// JSON payloads handed to the synthesizer) all add complexity.
    fn calculate_complexity(&self, messages: &[Message]) -> f64 {
        if messages.is_empty() {
            return 0.0;
        }

        let message_count = messages.len();
        let total_length: usize = messages.iter().map(|m| m.content.len()).sum();
        let avg_length = total_length / message_count;

        let count_complexity = (message_count as f64 / 10.0).min(0.5);
        let length_complexity = (avg_length as f64 / 1000.0).min(0.3);
        let has_structured = messages
            .iter()
            .any(|m| m.content.contains("```") || m.content.contains("\": {"));
        let structured_complexity = if has_structured { 0.2 } else { 0.0 };

        (count_complexity + length_complexity + structured_complexity).min(1.0)
    }

    /// ~4 characters per token
    fn estimate_tokens(&self, messages: &[Message]) -> usize {
        let total_chars: usize = messages.iter().map(|m| m.content.len()).sum();
        total_chars / 4
    }

    /// Rank providers for a profile, best first.
    ///
    /// 1. The configured default provider
    /// 2. Local providers for sensitive prompts
    /// 3. Cloud providers for complex or long prompts
    /// 4. Cheaper providers
    pub fn rank_providers(&self, profile: &TaskProfile) -> Vec<&dyn LLMProvider> {
        let mut providers: Vec<&dyn LLMProvider> =
            self.providers.iter().map(|b| b.as_ref()).collect();

        let score = |p: &dyn LLMProvider| -> f64 {
            let mut score = 0.0_f64;
            if p.name() == self.config.default_provider {
                score += 200.0;
            }
            if profile.sensitivity > self.config.sensitivity_threshold && p.is_local() {
                score += 100.0;
            }
            if profile.complexity > self.config.complexity_threshold && !p.is_local() {
                score += 100.0;
            }
            if profile.estimated_tokens > 4000 && !p.is_local() {
                score += 50.0;
            }
            score - p.estimated_cost(profile.estimated_tokens) * 1000.0
        };

        providers.sort_by(|a, b| {
            score(*b)
                .partial_cmp(&score(*a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        providers
    }

    /// Call providers in ranked order, retrying the whole ranking up to the
    /// retry budget. Returns the completion and the provider that produced it.
    pub async fn call(&self, messages: &[Message]) -> super::Result<(String, String)> {
        if self.providers.is_empty() {
            return Err(LLMError::ProviderUnavailable(
                "No LLM providers configured".to_string(),
            ));
        }

        let profile = self.analyze_task(messages);
        let ranked = self.rank_providers(&profile);
        let timeout = Duration::from_secs(self.config.timeout_secs.max(1));
        let passes = self.config.retry_budget.max(1);
        let mut last_error = None;

        for pass in 1..=passes {
            for provider in &ranked {
                tracing::debug!(
                    "Attempting provider: {} (pass {}/{}, timeout: {}s)",
                    provider.name(),
                    pass,
                    passes,
                    timeout.as_secs()
                );

                match tokio::time::timeout(timeout, provider.generate(messages)).await {
                    Ok(Ok(text)) => {
                        tracing::info!("Provider {} succeeded", provider.name());
                        return Ok((text, provider.name().to_string()));
                    }
                    Ok(Err(e)) => {
                        tracing::warn!("Provider {} failed: {}", provider.name(), e);
                        last_error = Some(e);
                    }
                    Err(_) => {
                        tracing::warn!(
                            "Provider {} timed out after {}s",
                            provider.name(),
                            timeout.as_secs()
                        );
                        last_error = Some(LLMError::Timeout);
                    }
                }
            }
        }

        tracing::error!("All LLM providers exhausted after {} pass(es)", passes);
        Err(LLMError::ProviderUnavailable(match last_error {
            Some(e) => format!("All LLM providers failed (last error: {})", e),
            None => "All LLM providers failed".to_string(),
        }))
    }

    /// Check the health of all registered providers
    pub async fn check_health(&self) -> Vec<ProviderHealth> {
        let mut results = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            results.push(ProviderHealth {
                name: provider.name().to_string(),
                local: provider.is_local(),
                healthy: provider.check_health().await,
            });
        }
        results
    }
}

#[async_trait]
impl CompletionPort for LLMRouter {
    async fn complete_messages(&self, messages: &[Message]) -> Result<String, EngineError> {
        let (text, provider) = self.call(messages).await?;
        tracing::debug!("Completion from {} ({} chars)", provider, text.len());
        Ok(strip_thinking(&text))
    }
}
