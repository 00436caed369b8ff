//! Synthesizer
//!
//! Folds the plan rationale and the per-capability results into one answer.
//! Only capabilities present in the results are mentioned, and failed ones
//! are reported as unavailable. When the completion port fails a
//! deterministic summary is built from the results instead.

use crate::conductor::types::SynthesisSummary;
use crate::llm::{strip_thinking, CompletionPort};
use crate::secrets::scrub_secrets;
use sdk::errors::EngineError;
use sdk::types::{CapabilityResult, PriorResults};
use serde_json::Value;
use std::sync::Arc;

/// Longest payload text shown to the model per capability
const MAX_PAYLOAD_CHARS: usize = 4000;

const SYSTEM_PROMPT: &str = "You write the final answer to the user from capability results.\n\
Rules:\n\
- Use only the results listed below; do not mention any other capability.\n\
- For a result marked UNAVAILABLE, say plainly that this information could not be \
retrieved. Never invent it.\n\
- Be concise and helpful.";

/// Answer text plus the structured success/failure summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub text: String,
    pub summary: SynthesisSummary,
}

pub struct Synthesizer {
    port: Arc<dyn CompletionPort>,
}

impl Synthesizer {
    pub fn new(port: Arc<dyn CompletionPort>) -> Self {
        Self { port }
    }

    /// Produce the final answer. Never fails when `results` is non-empty;
    /// the error case is a completion failure with nothing to fall back on.
    pub async fn synthesize(
        &self,
        user_input: &str,
        rationale: &str,
        results: &PriorResults,
        order: &[String],
    ) -> Result<Synthesis, EngineError> {
        let summary = SynthesisSummary::from_results(results, order);
        let prompt = format!(
            "User request: \"{}\"\nPlan rationale: {}\n\nResults:\n{}\n\nWrite the answer.",
            user_input,
            rationale,
            render_results(results, order)
        );

        match self.port.complete_with_system(SYSTEM_PROMPT, &prompt).await {
            Ok(text) if !strip_thinking(&text).is_empty() => Ok(Synthesis {
                text: strip_thinking(&text),
                summary,
            }),
            Ok(_) => fallback(results, order, summary, "empty completion".to_string()),
            Err(e) => {
                tracing::warn!("Synthesis completion failed, using fallback summary: {}", e);
                fallback(results, order, summary, e.to_string())
            }
        }
    }
}

fn fallback(
    results: &PriorResults,
    order: &[String],
    summary: SynthesisSummary,
    cause: String,
) -> Result<Synthesis, EngineError> {
    if results.is_empty() {
        return Err(EngineError::Completion(cause));
    }
    Ok(Synthesis {
        text: degraded_text(results, order, &cause),
        summary,
    })
}

/// Answer for a failed synthesis: the result headlines tagged with the
/// cause, or the bare `synthesis error: <cause>` when nothing ran
pub fn degraded_text(results: &PriorResults, order: &[String], cause: &str) -> String {
    let cause = scrub_secrets(cause);
    match fallback_text(results, order) {
        Some(text) => format!("{}\n(synthesis error: {})", text, cause),
        None => format!("synthesis error: {}", cause),
    }
}

/// One `[name] OK: <json>` / `[name] UNAVAILABLE: <error>` line per result
pub fn render_results(results: &PriorResults, order: &[String]) -> String {
    order
        .iter()
        .filter_map(|name| results.get(name).map(|r| render_line(name, r)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_line(name: &str, result: &CapabilityResult) -> String {
    if result.success {
        let mut payload = Value::Object(result.payload.clone()).to_string();
        if payload.len() > MAX_PAYLOAD_CHARS {
            let cut = (0..=MAX_PAYLOAD_CHARS)
                .rev()
                .find(|&i| payload.is_char_boundary(i))
                .unwrap_or(0);
            payload.truncate(cut);
            payload.push('…');
        }
        format!("[{}] OK: {}", name, payload)
    } else {
        format!(
            "[{}] UNAVAILABLE: {}",
            name,
            result.error.as_deref().unwrap_or("unknown error")
        )
    }
}

/// Deterministic answer assembled from the results alone
pub fn fallback_text(results: &PriorResults, order: &[String]) -> Option<String> {
    let lines: Vec<String> = order
        .iter()
        .filter_map(|name| {
            let result = results.get(name)?;
            Some(if result.success {
                format!("{}: {}", name, headline(result))
            } else {
                format!(
                    "{}: information unavailable ({})",
                    name,
                    result.error.as_deref().unwrap_or("unknown error")
                )
            })
        })
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Most readable single field of a successful payload
fn headline(result: &CapabilityResult) -> String {
    for key in ["text", "summary", "display_name", "title"] {
        if let Some(text) = result.payload_str(key) {
            return text.to_string();
        }
    }
    if let Some(Value::Array(periods)) = result.payload.get("periods") {
        if let Some(first) = periods.first() {
            return first.to_string();
        }
    }
    Value::Object(result.payload.clone()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct Recording {
        reply: Option<&'static str>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionPort for Recording {
        async fn complete_messages(&self, messages: &[Message]) -> Result<String, EngineError> {
            if let Some(last) = messages.last() {
                self.prompts.lock().unwrap().push(last.content.clone());
            }
            self.reply
                .map(str::to_string)
                .ok_or_else(|| EngineError::Completion("offline".to_string()))
        }
    }

    fn results() -> (PriorResults, Vec<String>) {
        let mut results = PriorResults::new();
        results.insert(
            "search".to_string(),
            CapabilityResult::from_json("search", json!({"summary": "Paris is the capital of France."})),
        );
        results.insert("weather".to_string(), CapabilityResult::timeout("weather"));
        (results, vec!["search".to_string(), "weather".to_string()])
    }

    #[test]
    fn test_render_marks_failures_unavailable() {
        let (results, order) = results();
        let rendered = render_results(&results, &order);
        assert_eq!(
            rendered,
            "[search] OK: {\"summary\":\"Paris is the capital of France.\"}\n[weather] UNAVAILABLE: timeout"
        );
    }

    #[tokio::test]
    async fn test_prompt_lists_only_results() {
        let port = Arc::new(Recording {
            reply: Some("<thinking>x</thinking>Paris is lovely; the forecast is unavailable."),
            prompts: Mutex::new(Vec::new()),
        });
        let (results, order) = results();

        let synthesis = Synthesizer::new(port.clone())
            .synthesize("weather in Paris", "weather needs coordinates", &results, &order)
            .await
            .unwrap();

        assert_eq!(synthesis.text, "Paris is lovely; the forecast is unavailable.");
        assert_eq!(synthesis.summary.failed, vec!["weather"]);
        let prompts = port.prompts.lock().unwrap();
        assert!(prompts[0].contains("[weather] UNAVAILABLE: timeout"));
        assert!(!prompts[0].contains("greeting"));
    }

    #[tokio::test]
    async fn test_completion_failure_uses_fallback() {
        let port = Arc::new(Recording { reply: None, prompts: Mutex::new(Vec::new()) });
        let (results, order) = results();

        let synthesis = Synthesizer::new(port)
            .synthesize("weather in Paris", "r", &results, &order)
            .await
            .unwrap();
        assert_eq!(
            synthesis.text,
            "search: Paris is the capital of France.\nweather: information unavailable (timeout)\n\
             (synthesis error: Completion error: offline)"
        );
        assert_eq!(synthesis.summary.succeeded, vec!["search"]);
    }

    #[tokio::test]
    async fn test_nothing_to_fall_back_on_is_an_error() {
        let port = Arc::new(Recording { reply: None, prompts: Mutex::new(Vec::new()) });
        let err = Synthesizer::new(port)
            .synthesize("hi", "r", &PriorResults::new(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Completion(_)));
    }

    #[test]
    fn test_degraded_text_names_the_cause() {
        let (results, order) = results();
        let text = degraded_text(&results, &order, "provider rejected sk-abcdefghijklmnopqrstuvwxyz0123");
        assert!(text.starts_with("search: Paris is the capital of France."));
        assert!(text.ends_with("(synthesis error: provider rejected [REDACTED])"), "got: {}", text);

        let bare = degraded_text(&PriorResults::new(), &[], "timeout");
        assert_eq!(bare, "synthesis error: timeout");
    }
}
