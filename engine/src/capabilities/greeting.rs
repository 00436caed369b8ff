//! Conversational fallback: greetings, small talk and thanks

use async_trait::async_trait;
use sdk::capability::{Capability, CapabilityContext};
use sdk::errors::EngineError;
use sdk::types::{CapabilityResult, PriorResults};
use std::sync::Arc;

use crate::llm::{strip_thinking, CompletionPort};

const NAME: &str = "greeting";

const SYSTEM_PROMPT: &str = "You are a friendly assistant. Reply warmly and briefly \
(one or two sentences) to greetings, thanks and casual conversation. \
Do not invent facts about weather, places or people.";

pub struct GreetingCapability {
    port: Arc<dyn CompletionPort>,
}

impl GreetingCapability {
    pub fn new(port: Arc<dyn CompletionPort>) -> Self {
        Self { port }
    }
}

#[async_trait]
impl Capability for GreetingCapability {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Friendly conversational reply for greetings, thanks and small talk"
    }

    async fn invoke(
        &self,
        _ctx: &CapabilityContext,
        input: &str,
        _prior: &PriorResults,
    ) -> Result<CapabilityResult, EngineError> {
        let reply = strip_thinking(&self.port.complete_with_system(SYSTEM_PROMPT, input).await?);
        if reply.is_empty() {
            return Ok(CapabilityResult::failure(NAME, "empty reply"));
        }
        Ok(CapabilityResult::text(NAME, reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    struct Echo;

    #[async_trait]
    impl CompletionPort for Echo {
        async fn complete_messages(&self, messages: &[Message]) -> Result<String, EngineError> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(format!("<thinking>plan</thinking> Hello! You said: {}", last))
        }
    }

    #[tokio::test]
    async fn test_greeting_returns_cleaned_text() {
        let capability = GreetingCapability::new(Arc::new(Echo));
        let result = capability
            .invoke(&CapabilityContext::new("s"), "hi there", &PriorResults::new())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.payload_str("text"), Some("Hello! You said: hi there"));
    }
}
