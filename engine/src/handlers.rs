//! Command handlers for CLI operations
//!
//! Builds the coordinator from configuration (providers, memory backend,
//! capabilities) and implements each CLI command on top of it:
//! - ask: answer one request
//! - chat: line-oriented conversation loop
//! - memory list / clear: session memory management
//! - status: capabilities and provider health

use anyhow::{Context, Result};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::capabilities::CapabilityRegistry;
use crate::cli::MemoryAction;
use crate::conductor::{Coordinator, ResponseEnvelope};
use crate::config::{Config, MemoryBackend};
use crate::db::Database;
use crate::llm::anthropic::AnthropicProvider;
use crate::llm::ollama::OllamaProvider;
use crate::llm::openai::OpenAIProvider;
use crate::llm::router::LLMRouter;
use crate::llm::{CompletionPort, LLMProvider};
use crate::memory::InMemoryStore;
use crate::secrets::{SecretManager, SecretString, SERVICE_NAME};
use sdk::errors::{ConciergeErrorExt, EngineError};
use sdk::memory::MemoryStore;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// A ready coordinator plus the database it writes to, if any
pub struct App {
    pub coordinator: Coordinator,
    pub database: Option<Database>,
}

impl App {
    /// Flush and close the database, if one is open
    pub async fn shutdown(self) -> Result<()> {
        if let Some(database) = self.database {
            database.close().await?;
        }
        Ok(())
    }
}

/// Key from the environment or keychain; an unreachable keychain counts as absent
fn api_key(secrets: &SecretManager, key: &str) -> Option<SecretString> {
    match secrets.get_secret(key) {
        Ok(secret) => secret,
        Err(e) => {
            tracing::warn!("Could not read '{}': {}", key, e);
            None
        }
    }
}

/// Providers for the router: Ollama always, cloud providers only when their
/// API key is available from the environment or the keychain.
pub fn build_providers(config: &Config, secrets: &SecretManager) -> Vec<Box<dyn LLMProvider>> {
    let mut providers: Vec<Box<dyn LLMProvider>> = vec![Box::new(OllamaProvider::new(
        config.llm.ollama.base_url.clone(),
        config.llm.ollama.model.clone(),
    ))];

    if let Some(key) = api_key(secrets, "openai_api_key") {
        providers.push(Box::new(OpenAIProvider::new(
            config.llm.openai.base_url.clone(),
            config.llm.openai.model.clone(),
            key,
        )));
    }

    if let Some(key) = api_key(secrets, "anthropic_api_key") {
        providers.push(Box::new(AnthropicProvider::new(
            config.llm.anthropic.base_url.clone(),
            config.llm.anthropic.model.clone(),
            key,
        )));
    }

    if let Some(key) = api_key(secrets, "nvidia_api_key") {
        providers.push(Box::new(OpenAIProvider::nvidia_nim(
            config.llm.nvidia_nim.base_url.clone(),
            config.llm.nvidia_nim.model.clone(),
            key,
        )));
    }

    providers
}

/// Wire providers, memory store and capabilities into a coordinator
pub async fn build_app(config: &Config) -> Result<App> {
    let secrets = SecretManager::new(SERVICE_NAME);
    let providers = build_providers(config, &secrets);
    tracing::info!("Configured {} LLM provider(s)", providers.len());

    let router = Arc::new(LLMRouter::new(providers, Arc::new(config.llm.clone())));
    let port: Arc<dyn CompletionPort> = Arc::clone(&router) as Arc<dyn CompletionPort>;

    let (store, database): (Arc<dyn MemoryStore>, Option<Database>) = match config.memory.backend {
        MemoryBackend::Sqlite => {
            let database = Database::new(&config.database_path())
                .await
                .context("Failed to open memory database")?;
            let store: Arc<dyn MemoryStore> = Arc::new(database.memories());
            (store, Some(database))
        }
        MemoryBackend::Memory => {
            tracing::info!("Ephemeral memory: nothing is written to disk");
            let store: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
            (store, None)
        }
    };

    let registry = CapabilityRegistry::with_builtins(&config.capabilities, Arc::clone(&port), Arc::clone(&store));
    let coordinator = Coordinator::new(port, registry, store, config).with_router(router);

    Ok(App { coordinator, database })
}

/// Render an envelope: the synthesis, then the technical data as JSON
pub fn render_envelope(envelope: &ResponseEnvelope, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => envelope.to_json(),
        OutputFormat::Text => {
            if envelope.needs_clarification {
                return envelope.synthesis.clone();
            }
            let technical = json!({
                "success": envelope.success,
                "plan": envelope.plan,
                "execution_order": envelope.execution_order,
                "summary": envelope.summary,
                "results": envelope.results,
            });
            format!(
                "{}\n\n--- technical data ---\n{}",
                envelope.synthesis,
                serde_json::to_string_pretty(&technical).unwrap_or_default()
            )
        }
    }
}

fn render_error(error: &EngineError, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json!({
            "success": false,
            "error": error.to_string(),
            "hint": error.user_hint(),
        })
        .to_string(),
        OutputFormat::Text => format!("{}\nHint: {}", error, error.user_hint()),
    }
}

/// Answer a single request
pub async fn handle_ask(
    coordinator: &Coordinator,
    text: &str,
    session_id: &str,
    format: OutputFormat,
) -> Result<()> {
    let envelope = coordinator.handle(text, session_id).await.map_err(|e| {
        anyhow::anyhow!(render_error(&e, format))
    })?;
    println!("{}", render_envelope(&envelope, format));
    Ok(())
}

/// Line-oriented conversation loop over `reader`, writing replies to `out`
pub async fn handle_chat<R, W>(
    coordinator: &Coordinator,
    session_id: &str,
    format: OutputFormat,
    reader: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = reader.lines();
    if format == OutputFormat::Text {
        writeln!(out, "Concierge chat (session '{}'). Type 'quit' or 'exit' to leave.", session_id)?;
    }

    loop {
        if format == OutputFormat::Text {
            write!(out, "> ")?;
            out.flush()?;
        }

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let line = line.trim();

        if line.is_empty() {
            writeln!(out, "Please type a request (or 'quit' to leave).")?;
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }

        match coordinator.handle(line, session_id).await {
            Ok(envelope) => writeln!(out, "{}", render_envelope(&envelope, format))?,
            Err(e) => writeln!(out, "{}", render_error(&e, format))?,
        }
    }

    if format == OutputFormat::Text {
        writeln!(out, "Goodbye!")?;
    }
    Ok(())
}

/// List or clear the session's memories
pub async fn handle_memory(
    coordinator: &Coordinator,
    action: MemoryAction,
    session_id: &str,
    format: OutputFormat,
) -> Result<()> {
    match action {
        MemoryAction::List => {
            let records = coordinator
                .list_memories(session_id)
                .await
                .context("Failed to list memories")?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                OutputFormat::Text if records.is_empty() => {
                    println!("No memories stored for session '{}'.", session_id)
                }
                OutputFormat::Text => {
                    println!("Memories for session '{}':", session_id);
                    for (i, record) in records.iter().enumerate() {
                        println!("  {}. {}", i + 1, record.content);
                    }
                }
            }
        }
        MemoryAction::Clear => {
            let deleted = coordinator
                .clear_memories(session_id)
                .await
                .context("Failed to clear memories")?;
            match format {
                OutputFormat::Json => println!("{}", json!({ "deleted": deleted })),
                OutputFormat::Text => println!("Deleted {} memories.", deleted),
            }
        }
    }
    Ok(())
}

/// Show capabilities, providers and memory backend
pub async fn handle_status(coordinator: &Coordinator, format: OutputFormat) -> Result<()> {
    let status = coordinator.status().await;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Text => {
            println!("Capabilities: {}", status.capabilities.join(", "));
            println!("Default plan: {}", status.default_plan.join(", "));
            println!("Memory backend: {}", status.memory_backend);
            println!("Providers:");
            for provider in &status.providers {
                println!(
                    "  {:<12} {:<6} {}",
                    provider.name,
                    if provider.local { "local" } else { "cloud" },
                    if provider.healthy { "✓ healthy" } else { "✗ unavailable" }
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::PipelineState;
    use crate::llm::Message;
    use async_trait::async_trait;

    struct Canned;

    #[async_trait]
    impl CompletionPort for Canned {
        async fn complete_messages(&self, messages: &[Message]) -> Result<String, EngineError> {
            let system = messages.first().map(|m| m.content.as_str()).unwrap_or_default();
            Ok(if system.contains("NEED_MORE or PROCEED") {
                "PROCEED".to_string()
            } else if system.contains("execution planner") {
                r#"{"capabilities": ["echo"], "rationale": "echo it"}"#.to_string()
            } else if system.contains("worth remembering") {
                "000000".to_string()
            } else {
                "Here you go.".to_string()
            })
        }
    }

    fn coordinator() -> Coordinator {
        let config = Config::default();
        Coordinator::new(
            Arc::new(Canned),
            CapabilityRegistry::new(),
            Arc::new(InMemoryStore::new()),
            &config,
        )
    }

    #[tokio::test]
    async fn test_chat_skips_blank_lines_and_quits() {
        let coordinator = coordinator();
        let input: &[u8] = b"\n   \nhello there\nquit\nnever reached\n";
        let mut out = Vec::new();

        handle_chat(&coordinator, "s", OutputFormat::Json, input, &mut out)
            .await
            .unwrap();

        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.matches("Please type a request").count(), 2);
        assert_eq!(out.matches("\"user_input\": \"hello there\"").count(), 1);
        assert!(!out.contains("never reached"));
    }

    #[test]
    fn test_render_text_includes_technical_data() {
        let envelope = ResponseEnvelope {
            success: true,
            session_id: "s".to_string(),
            user_input: "hi".to_string(),
            plan: None,
            results: Default::default(),
            execution_order: vec![],
            skipped: vec![],
            synthesis: "Hello!".to_string(),
            summary: Default::default(),
            needs_clarification: false,
            states: vec![PipelineState::Done],
        };
        let text = render_envelope(&envelope, OutputFormat::Text);
        assert!(text.starts_with("Hello!\n\n--- technical data ---\n"));
        assert!(text.contains("\"success\": true"));
    }

    #[test]
    fn test_render_clarification_is_just_the_question() {
        let envelope = ResponseEnvelope::clarification("s", "coffee", "Which coffee?".to_string(), vec![]);
        assert_eq!(render_envelope(&envelope, OutputFormat::Text), "Which coffee?");
    }
}
