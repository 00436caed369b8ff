//! Explicit memory management requested by the user
//!
//! The action is chosen by the completion port and validated to
//! `store | retrieve | clear`; anything else is treated as `retrieve`.

use async_trait::async_trait;
use sdk::capability::{Capability, CapabilityContext};
use sdk::errors::EngineError;
use sdk::memory::MemoryStore;
use sdk::types::{CapabilityResult, PriorResults};
use serde_json::{json, Map};
use std::sync::Arc;

use crate::llm::CompletionPort;

const NAME: &str = "memory";

const ACTION_PROMPT: &str = "Decide which memory action the user wants. \
Answer with exactly one word: store (remember something new), \
retrieve (recall what was saved) or clear (forget everything).";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAction {
    Store,
    Retrieve,
    Clear,
}

impl MemoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Retrieve => "retrieve",
            Self::Clear => "clear",
        }
    }

    /// First recognised action word in a completion; `Retrieve` otherwise
    pub fn parse(text: &str) -> Self {
        text.split(|c: char| !c.is_ascii_alphabetic())
            .find_map(|word| match word.to_ascii_lowercase().as_str() {
                "store" => Some(Self::Store),
                "retrieve" => Some(Self::Retrieve),
                "clear" => Some(Self::Clear),
                _ => None,
            })
            .unwrap_or(Self::Retrieve)
    }
}

pub struct MemoryCapability {
    port: Arc<dyn CompletionPort>,
    store: Arc<dyn MemoryStore>,
}

impl MemoryCapability {
    pub fn new(port: Arc<dyn CompletionPort>, store: Arc<dyn MemoryStore>) -> Self {
        Self { port, store }
    }

    async fn choose_action(&self, input: &str) -> MemoryAction {
        match self.port.complete_with_system(ACTION_PROMPT, input).await {
            Ok(text) => MemoryAction::parse(&text),
            Err(e) => {
                tracing::warn!("Memory action selection failed, retrieving: {}", e);
                MemoryAction::Retrieve
            }
        }
    }
}

#[async_trait]
impl Capability for MemoryCapability {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Store, retrieve or clear what the user asked to remember in this session"
    }

    async fn invoke(
        &self,
        ctx: &CapabilityContext,
        input: &str,
        _prior: &PriorResults,
    ) -> Result<CapabilityResult, EngineError> {
        let action = self.choose_action(input).await;
        tracing::info!("Memory action '{}' for session {}", action.as_str(), ctx.session_id);

        let mut payload = Map::new();
        payload.insert("action".to_string(), json!(action.as_str()));

        match action {
            MemoryAction::Store => {
                let content = input.trim();
                if content.is_empty() {
                    return Ok(CapabilityResult::failure(NAME, "nothing to store"));
                }
                let needle = content.to_lowercase();
                let existing = self.store.list(&ctx.session_id).await?;
                if existing.iter().any(|r| r.content.trim().to_lowercase() == needle) {
                    tracing::debug!("Session {} already remembers this", ctx.session_id);
                    payload.insert("status".to_string(), json!("already remembered"));
                    return Ok(CapabilityResult::success(NAME, payload));
                }
                if !self.store.store(&ctx.session_id, content).await? {
                    return Ok(CapabilityResult::failure(NAME, "memory store refused the record"));
                }
                payload.insert("status".to_string(), json!("stored"));
                payload.insert("stored".to_string(), json!(content));
            }
            MemoryAction::Retrieve => {
                let records: Vec<String> = self
                    .store
                    .list(&ctx.session_id)
                    .await?
                    .into_iter()
                    .map(|r| r.content)
                    .collect();
                payload.insert("count".to_string(), json!(records.len()));
                payload.insert("records".to_string(), json!(records));
            }
            MemoryAction::Clear => {
                let deleted = self.store.clear(&ctx.session_id).await?;
                payload.insert("deleted".to_string(), json!(deleted));
            }
        }

        Ok(CapabilityResult::success(NAME, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use crate::memory::InMemoryStore;

    struct Fixed(&'static str);

    #[async_trait]
    impl CompletionPort for Fixed {
        async fn complete_messages(&self, _messages: &[Message]) -> Result<String, EngineError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_parse_action_closed_set() {
        assert_eq!(MemoryAction::parse("Store"), MemoryAction::Store);
        assert_eq!(MemoryAction::parse("action: clear."), MemoryAction::Clear);
        assert_eq!(MemoryAction::parse("I think retrieve"), MemoryAction::Retrieve);
        assert_eq!(MemoryAction::parse("delete everything"), MemoryAction::Retrieve);
        assert_eq!(MemoryAction::parse(""), MemoryAction::Retrieve);
    }

    #[tokio::test]
    async fn test_store_then_retrieve_then_clear() {
        let store: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        let ctx = CapabilityContext::new("alice");
        let prior = PriorResults::new();

        let stored = MemoryCapability::new(Arc::new(Fixed("store")), Arc::clone(&store))
            .invoke(&ctx, "my favourite colour is green", &prior)
            .await
            .unwrap();
        assert!(stored.success);
        assert_eq!(stored.payload_str("stored"), Some("my favourite colour is green"));

        let retrieved = MemoryCapability::new(Arc::new(Fixed("retrieve")), Arc::clone(&store))
            .invoke(&ctx, "what did I tell you?", &prior)
            .await
            .unwrap();
        assert_eq!(retrieved.payload["count"], json!(1));
        assert_eq!(retrieved.payload["records"][0], json!("my favourite colour is green"));

        let cleared = MemoryCapability::new(Arc::new(Fixed("clear")), Arc::clone(&store))
            .invoke(&ctx, "forget everything", &prior)
            .await
            .unwrap();
        assert_eq!(cleared.payload["deleted"], json!(1));
        assert!(store.list("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_skips_content_already_remembered() {
        let store: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        store.store("bob", "I live in Seattle").await.unwrap();
        let capability = MemoryCapability::new(Arc::new(Fixed("store")), Arc::clone(&store));
        let ctx = CapabilityContext::new("bob");

        let result = capability
            .invoke(&ctx, "  i live in seattle ", &PriorResults::new())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.payload_str("status"), Some("already remembered"));
        assert_eq!(result.payload_str("stored"), None);
        assert_eq!(store.list("bob").await.unwrap().len(), 1);

        // Another session is unaffected
        let other = capability
            .invoke(&CapabilityContext::new("carol"), "I live in Seattle", &PriorResults::new())
            .await
            .unwrap();
        assert_eq!(other.payload_str("status"), Some("stored"));
        assert_eq!(store.list("carol").await.unwrap().len(), 1);
    }
}
