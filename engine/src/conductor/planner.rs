//! Conductor Planner
//!
//! Asks the completion port which capabilities to run and in what order,
//! then validates the answer against the registry. The planner never
//! invokes a capability.

use crate::capabilities::CapabilityRegistry;
use crate::conductor::types::ExecutionPlan;
use crate::llm::{extract_json_object, CompletionPort};
use sdk::errors::EngineError;
use serde::Deserialize;
use std::sync::Arc;

/// Capability that supplies coordinates
const LOCATION_CAPABILITY: &str = "search";
/// Capability that consumes them
const WEATHER_CAPABILITY: &str = "weather";

const SYSTEM_PROMPT: &str = "You are an execution planner. Decide which capabilities \
should handle the user's request and in which order. Never answer the request yourself.\n\n\
Rules:\n\
- Weather requests: run search first (it finds the coordinates), then weather.\n\
- Questions about places, people or general knowledge: search only.\n\
- Greetings, thanks and small talk: greeting only.\n\
- Requests to remember, recall or forget things: memory only.\n\n\
Respond with JSON only, no markdown:\n\
{\"capabilities\": [\"name\", ...], \"rationale\": \"short explanation\"}";

/// Intermediate deserialization type for model JSON output.
/// Accepts the older `agents_to_execute` / `reasoning` keys too.
#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(alias = "agents_to_execute", alias = "agents", default)]
    capabilities: Vec<String>,
    #[serde(alias = "reasoning", default)]
    rationale: String,
}

pub struct Planner {
    port: Arc<dyn CompletionPort>,
    default_plan: Vec<String>,
}

impl Planner {
    pub fn new(port: Arc<dyn CompletionPort>, default_plan: Vec<String>) -> Self {
        Self { port, default_plan }
    }

    /// Produce a validated plan.
    ///
    /// Returns `EngineError::Planning` when the completion fails or cannot be
    /// parsed. A parsed plan that validates to nothing becomes the fallback.
    pub async fn plan(
        &self,
        user_input: &str,
        recalled_context: Option<&str>,
        registry: &CapabilityRegistry,
    ) -> Result<ExecutionPlan, EngineError> {
        let prompt = format!(
            "Available capabilities:\n{}\n\nConversation context: {}\n\nUser request: \"{}\"\n\n\
            Which capabilities should run? Return JSON only.",
            registry.describe(),
            recalled_context.unwrap_or("(none)"),
            user_input
        );

        let response = self
            .port
            .complete_with_system(SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|e| EngineError::Planning(format!("completion failed: {}", e)))?;

        let raw = parse_plan_response(&response)?;
        let capabilities = validate_plan(&raw.capabilities, &registry.names());

        if capabilities.is_empty() {
            tracing::warn!(
                "Plan {:?} has no registered capabilities, using default plan",
                raw.capabilities
            );
            return Ok(ExecutionPlan::fallback(&self.default_plan));
        }

        tracing::info!("Plan: {:?} ({})", capabilities, raw.rationale);
        Ok(ExecutionPlan {
            capabilities,
            rationale: raw.rationale,
        })
    }
}

fn parse_plan_response(content: &str) -> Result<RawPlan, EngineError> {
    let json = extract_json_object(content)
        .ok_or_else(|| EngineError::Planning("no JSON object in planner output".to_string()))?;
    serde_json::from_str(json)
        .map_err(|e| EngineError::Planning(format!("unparsable plan: {}", e)))
}

/// Map a raw name onto registry naming: lowercase, no `_agent` suffix,
/// and the old conversational names folded into `greeting`.
fn normalize_name(name: &str) -> String {
    let name = name.trim().to_lowercase();
    let name = name.strip_suffix("_agent").unwrap_or(&name);
    match name {
        "extra" | "conversation" | "chat" => "greeting".to_string(),
        other => other.to_string(),
    }
}

/// Validate raw capability names against the registered set.
///
/// Unknown names and duplicates are dropped, order is otherwise kept. When
/// `weather` is selected and `search` is registered, `search` is placed
/// immediately ahead of `weather` unless it already runs earlier.
pub fn validate_plan(names: &[String], known: &[String]) -> Vec<String> {
    let mut plan: Vec<String> = Vec::new();
    for name in names.iter().map(|n| normalize_name(n)) {
        if known.contains(&name) && !plan.contains(&name) {
            plan.push(name);
        }
    }

    let location_known = known.iter().any(|k| k == LOCATION_CAPABILITY);
    if let Some(weather_at) = plan.iter().position(|n| n == WEATHER_CAPABILITY) {
        if location_known {
            match plan.iter().position(|n| n == LOCATION_CAPABILITY) {
                Some(search_at) if search_at < weather_at => {}
                Some(search_at) => {
                    plan.remove(search_at);
                    plan.insert(weather_at, LOCATION_CAPABILITY.to_string());
                }
                None => plan.insert(weather_at, LOCATION_CAPABILITY.to_string()),
            }
        }
    }

    plan
}
