//! Capability registry and built-in capabilities
//!
//! The registry maps a lowercase capability name to an invocable handler.
//! Registration order is preserved; it is the order capabilities are
//! described to the planner.

pub mod greeting;
pub mod memory;
pub mod search;
pub mod weather;

pub use greeting::GreetingCapability;
pub use memory::MemoryCapability;
pub use search::SearchCapability;
pub use weather::WeatherCapability;

use crate::config::CapabilitiesConfig;
use crate::llm::CompletionPort;
use sdk::capability::Capability;
use sdk::memory::MemoryStore;
use std::sync::Arc;
use std::time::Duration;

/// Ordered name -> handler map
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    entries: Vec<(String, Arc<dyn Capability>)>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the built-ins enabled in `config`
    pub fn with_builtins(
        config: &CapabilitiesConfig,
        port: Arc<dyn CompletionPort>,
        store: Arc<dyn MemoryStore>,
    ) -> Self {
        let mut registry = Self::new();
        let client = http_client(&config.user_agent, config.timeout());

        if config.search {
            registry.register(Arc::new(SearchCapability::new(
                client.clone(),
                &config.wikipedia_base_url,
                &config.nominatim_base_url,
            )));
        }
        if config.weather {
            registry.register(Arc::new(WeatherCapability::new(
                client,
                &config.weather_base_url,
                &config.open_meteo_base_url,
            )));
        }
        if config.greeting {
            registry.register(Arc::new(GreetingCapability::new(Arc::clone(&port))));
        }
        if config.memory {
            registry.register(Arc::new(MemoryCapability::new(port, store)));
        }

        registry
    }

    /// Add a capability, replacing any earlier one with the same name in place.
    /// Returns true if an existing entry was replaced.
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> bool {
        let name = capability.name().trim().to_lowercase();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            tracing::warn!("Capability '{}' registered twice, replacing", name);
            slot.1 = capability;
            return true;
        }
        tracing::debug!("Registered capability '{}'", name);
        self.entries.push((name, capability));
        false
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        let name = name.trim().to_lowercase();
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| Arc::clone(c))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    /// One `- name: description` line per capability, for planner prompts
    pub fn describe(&self) -> String {
        self.entries
            .iter()
            .map(|(name, c)| format!("- {}: {}", name, c.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// HTTP client shared by the network-backed capabilities
pub fn http_client(user_agent: &str, timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Map a transport error into the capability error kind
pub(crate) fn network_error(capability: &str, e: reqwest::Error) -> sdk::errors::EngineError {
    if e.is_timeout() {
        sdk::errors::EngineError::capability(capability, "upstream request timed out")
    } else {
        sdk::errors::EngineError::Network(format!("{}: {}", capability, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sdk::capability::CapabilityContext;
    use sdk::errors::EngineError;
    use sdk::types::{CapabilityResult, PriorResults};

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl Capability for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            self.1
        }

        async fn invoke(
            &self,
            _ctx: &CapabilityContext,
            input: &str,
            _prior: &PriorResults,
        ) -> Result<CapabilityResult, EngineError> {
            Ok(CapabilityResult::text(self.0, input))
        }
    }

    #[test]
    fn test_register_normalises_names_and_keeps_order() {
        let mut registry = CapabilityRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(Named("Search", "look things up")));
        registry.register(Arc::new(Named("weather", "forecasts")));

        assert_eq!(registry.names(), vec!["search", "weather"]);
        assert!(registry.contains("SEARCH"));
        assert!(registry.contains(" weather "));
        assert!(!registry.contains("greeting"));
        assert_eq!(
            registry.describe(),
            "- search: look things up\n- weather: forecasts"
        );
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(Named("search", "v1")));
        registry.register(Arc::new(Named("weather", "forecasts")));
        assert!(registry.register(Arc::new(Named("search", "v2"))));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["search", "weather"]);
        assert_eq!(registry.get("search").unwrap().description(), "v2");
    }

    #[tokio::test]
    async fn test_builtins_follow_config_flags() {
        use crate::memory::InMemoryStore;

        struct Silent;

        #[async_trait]
        impl CompletionPort for Silent {
            async fn complete_messages(
                &self,
                _messages: &[crate::llm::Message],
            ) -> Result<String, EngineError> {
                Ok(String::new())
            }
        }

        let config = CapabilitiesConfig {
            weather: false,
            ..Default::default()
        };
        let registry =
            CapabilityRegistry::with_builtins(&config, Arc::new(Silent), Arc::new(InMemoryStore::new()));
        assert_eq!(registry.names(), vec!["search", "greeting", "memory"]);
    }
}
