//! Conductor Executor
//!
//! Runs a plan's capabilities in order. Each invocation is isolated: a
//! timeout, an `Err` or a panic becomes a failed `CapabilityResult` and the
//! next capability still runs. Later capabilities see earlier results
//! through `PriorResults`.

use crate::capabilities::CapabilityRegistry;
use crate::conductor::types::ExecutionPlan;
use crate::secrets::scrub_secrets;
use futures::FutureExt;
use sdk::capability::CapabilityContext;
use sdk::types::{CapabilityResult, PriorResults};
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Error text recorded when a capability panics
pub const PANIC_ERROR: &str = "capability panicked";

/// Results of one plan execution
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub results: PriorResults,
    /// Capabilities that actually ran, in order
    pub order: Vec<String>,
    /// Planned names with no registered handler
    pub skipped: Vec<String>,
}

pub struct Executor {
    registry: CapabilityRegistry,
    timeout: Duration,
}

impl Executor {
    pub fn new(registry: CapabilityRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Execute every planned capability sequentially
    pub async fn execute(
        &self,
        ctx: &CapabilityContext,
        plan: &ExecutionPlan,
        user_input: &str,
    ) -> ExecutionOutcome {
        let mut outcome = ExecutionOutcome::default();

        for raw_name in &plan.capabilities {
            let name = raw_name.trim().to_lowercase();
            if outcome.results.contains_key(&name) {
                debug!("Capability '{}' already ran in this plan", name);
                continue;
            }

            let Some(capability) = self.registry.get(&name) else {
                warn!("No capability registered as '{}', skipping", name);
                outcome.skipped.push(name);
                continue;
            };

            let start = Instant::now();
            let invocation = AssertUnwindSafe(capability.invoke(ctx, user_input, &outcome.results))
                .catch_unwind();

            let result = match tokio::time::timeout(self.timeout, invocation).await {
                Ok(Ok(Ok(mut result))) => {
                    // The registry name is the result key, whatever the handler reports
                    result.capability = name.clone();
                    result.error = result.error.map(|e| scrub_secrets(&e));
                    result
                }
                Ok(Ok(Err(e))) => CapabilityResult::failure(&name, scrub_secrets(&e.to_string())),
                Ok(Err(_)) => {
                    warn!("Capability '{}' panicked", name);
                    CapabilityResult::failure(&name, PANIC_ERROR)
                }
                Err(_) => {
                    warn!("Capability '{}' timed out after {:?}", name, self.timeout);
                    CapabilityResult::timeout(&name)
                }
            };

            if result.success {
                info!("Capability '{}' succeeded in {:.1}s", name, start.elapsed().as_secs_f64());
            } else {
                warn!(
                    "Capability '{}' failed: {}",
                    name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }

            outcome.order.push(name.clone());
            outcome.results.insert(name, result);
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sdk::capability::Capability;
    use sdk::errors::EngineError;
    use serde_json::json;
    use std::sync::Arc;

    enum Behaviour {
        Coordinates,
        EchoPrior,
        Fail,
        Panic,
        Hang,
    }

    struct Fake(&'static str, Behaviour);

    #[async_trait]
    impl Capability for Fake {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "fake"
        }

        async fn invoke(
            &self,
            _ctx: &CapabilityContext,
            _input: &str,
            prior: &PriorResults,
        ) -> Result<CapabilityResult, EngineError> {
            match self.1 {
                Behaviour::Coordinates => Ok(CapabilityResult::from_json(
                    self.0,
                    json!({"latitude": 48.85, "longitude": 2.35}),
                )),
                Behaviour::EchoPrior => Ok(CapabilityResult::from_json(
                    self.0,
                    json!({"seen": prior.keys().cloned().collect::<Vec<_>>()}),
                )),
                Behaviour::Fail => Err(EngineError::capability(self.0, "boom")),
                Behaviour::Panic => panic!("bad state"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(CapabilityResult::text(self.0, "late"))
                }
            }
        }
    }

    fn executor(capabilities: Vec<Fake>) -> Executor {
        let mut registry = CapabilityRegistry::new();
        for c in capabilities {
            registry.register(Arc::new(c));
        }
        Executor::new(registry, Duration::from_millis(50))
    }

    fn plan(names: &[&str]) -> ExecutionPlan {
        ExecutionPlan {
            capabilities: names.iter().map(|s| s.to_string()).collect(),
            rationale: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_prior_results_flow_forward() {
        let executor = executor(vec![
            Fake("search", Behaviour::Coordinates),
            Fake("weather", Behaviour::EchoPrior),
        ]);
        let outcome = executor
            .execute(&CapabilityContext::new("s"), &plan(&["search", "weather"]), "weather in Paris")
            .await;

        assert_eq!(outcome.order, vec!["search", "weather"]);
        assert_eq!(outcome.results["weather"].payload["seen"], json!(["search"]));
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let executor = executor(vec![
            Fake("search", Behaviour::Fail),
            Fake("greeting", Behaviour::Panic),
            Fake("weather", Behaviour::Hang),
            Fake("memory", Behaviour::EchoPrior),
        ]);
        let outcome = executor
            .execute(
                &CapabilityContext::new("s"),
                &plan(&["search", "greeting", "weather", "memory"]),
                "x",
            )
            .await;

        assert_eq!(outcome.results.len(), 4);
        assert_eq!(
            outcome.results["search"].error.as_deref(),
            Some("Capability error in search: boom")
        );
        assert_eq!(outcome.results["greeting"].error.as_deref(), Some(PANIC_ERROR));
        assert!(outcome.results["weather"].is_timeout());
        assert!(outcome.results["memory"].success);
    }

    #[tokio::test]
    async fn test_missing_handlers_and_duplicates_are_skipped() {
        let executor = executor(vec![Fake("search", Behaviour::Coordinates)]);
        let outcome = executor
            .execute(&CapabilityContext::new("s"), &plan(&["stocks", "search", "SEARCH"]), "x")
            .await;

        assert_eq!(outcome.order, vec!["search"]);
        assert_eq!(outcome.skipped, vec!["stocks"]);
        assert_eq!(outcome.results.len(), 1);
    }
}
