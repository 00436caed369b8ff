use super::{LLMError, LLMProvider, Message, MessageRole};
use crate::secrets::SecretString;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub struct AnthropicProvider {
    base_url: String,
    model: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Split system messages out; Anthropic takes them as a top-level field.
    fn split_system(messages: &[Message]) -> (String, Vec<serde_json::Value>) {
        let mut system_prompt = String::new();
        let mut api_messages = Vec::new();
        for msg in messages {
            if msg.role == MessageRole::System {
                if !system_prompt.is_empty() {
                    system_prompt.push('\n');
                }
                system_prompt.push_str(&msg.content);
                continue;
            }
            api_messages.push(json!({
                "role": if msg.role == MessageRole::Assistant { "assistant" } else { "user" },
                "content": msg.content
            }));
        }
        (system_prompt, api_messages)
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn is_local(&self) -> bool {
        false
    }

    fn estimated_cost(&self, tokens: usize) -> f64 {
        // Approx $0.003 per 1k tokens for claude sonnet
        (tokens as f64 / 1000.0) * 0.003
    }

    async fn check_health(&self) -> bool {
        !self.api_key.unsecure().is_empty()
    }

    async fn generate(&self, messages: &[Message]) -> super::Result<String> {
        let url = format!("{}/messages", self.base_url);
        let (system_prompt, api_messages) = Self::split_system(messages);

        let payload = json!({
            "model": self.model,
            "max_tokens": 4096,
            "system": system_prompt,
            "messages": api_messages,
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.unsecure())
            .header("anthropic-version", "2023-06-01")
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
                500..=599 => LLMError::ProviderUnavailable(format!("anthropic ({})", status)),
                _ => LLMError::InvalidRequest(text),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let content_arr = data
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| LLMError::ParseError("No content array in response".to_string()))?;

        let full_content: String = content_arr
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect();

        Ok(full_content)
    }
}
