//! OpenAI-compatible chat completions provider
//!
//! Serves both OpenAI and NVIDIA NIM, which expose the same
//! `/chat/completions` API under different base URLs and price points.

use super::{LLMError, LLMProvider, Message};
use crate::secrets::SecretString;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub struct OpenAIProvider {
    name: &'static str,
    base_url: String,
    model: String,
    api_key: SecretString,
    cost_per_1k: f64,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// OpenAI proper. Approx $0.002 per 1k tokens for gpt-4o-mini.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: SecretString) -> Self {
        Self::with_identity("openai", base_url, model, api_key, 0.002)
    }

    /// NVIDIA NIM, priced like a mid-size hosted model
    pub fn nvidia_nim(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: SecretString,
    ) -> Self {
        Self::with_identity("nvidia_nim", base_url, model, api_key, 0.001)
    }

    fn with_identity(
        name: &'static str,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: SecretString,
        cost_per_1k: f64,
    ) -> Self {
        Self {
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            cost_per_1k,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn is_local(&self) -> bool {
        false
    }

    fn estimated_cost(&self, tokens: usize) -> f64 {
        (tokens as f64 / 1000.0) * self.cost_per_1k
    }

    async fn check_health(&self) -> bool {
        !self.api_key.unsecure().is_empty()
    }

    async fn generate(&self, messages: &[Message]) -> super::Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let api_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let payload = json!({
            "model": self.model,
            "messages": api_messages,
        });

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.unsecure()),
            )
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else {
                    LLMError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed(text),
                429 => LLMError::RateLimitExceeded,
                500..=599 => LLMError::ProviderUnavailable(format!("{} ({})", self.name, status)),
                _ => LLMError::InvalidRequest(text),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        data.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(str::to_string)
            .ok_or_else(|| LLMError::ParseError("No message content in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_identities() {
        let openai = OpenAIProvider::new("https://api.openai.com/v1/", "gpt-4o-mini", "sk".into());
        assert_eq!(openai.name(), "openai");
        assert!(!openai.is_local());
        assert_eq!(openai.base_url, "https://api.openai.com/v1");

        let nim = OpenAIProvider::nvidia_nim("https://integrate.api.nvidia.com/v1", "m", "k".into());
        assert_eq!(nim.name(), "nvidia_nim");
        assert!(nim.estimated_cost(1000) < openai.estimated_cost(1000));
    }
}
