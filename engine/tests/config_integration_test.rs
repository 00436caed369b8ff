//! Integration tests for configuration management
//!
//! These tests verify that a full `config.toml` loads, validates and is
//! processed (data directory creation, plan normalisation) through the
//! public API.

use concierge_engine::config::{Config, MemoryBackend};
use sdk::errors::EngineError;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_config_toml_parsing() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let path = write_config(
        &dir,
        &format!(
            r#"
[core]
log_level = "debug"
data_dir = {:?}
default_session = "alice"

[llm]
default_provider = "anthropic"
sensitivity_threshold = 0.6
complexity_threshold = 0.9
timeout_secs = 30
retry_budget = 2

[llm.ollama]
base_url = "http://localhost:11434"
model = "qwen2.5:7b"

[llm.anthropic]
model = "claude-3-5-haiku-latest"

[capabilities]
greeting = false
timeout_secs = 5
default_plan = ["Search", " greeting "]
user_agent = "concierge-test/1.0"
weather_base_url = "http://localhost:9000"

[pipeline]
plan_timeout_secs = 12
synthesis_timeout_secs = 40

[memory]
backend = "memory"
max_recall_records = 5
"#,
            data_dir.to_str().unwrap()
        ),
    );

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.core.default_session, "alice");
    assert!(data_dir.exists(), "data_dir should be created");

    assert_eq!(config.llm.default_provider, "anthropic");
    assert_eq!(config.llm.retry_budget, 2);
    assert_eq!(config.llm.ollama.model, "qwen2.5:7b");
    assert_eq!(config.llm.anthropic.model, "claude-3-5-haiku-latest");
    // Untouched provider tables keep their defaults
    assert_eq!(config.llm.openai.model, "gpt-4o-mini");

    assert!(config.capabilities.search);
    assert!(!config.capabilities.greeting);
    assert_eq!(config.capabilities.default_plan, vec!["search", "greeting"]);
    assert_eq!(config.capabilities.timeout().as_secs(), 5);
    assert_eq!(config.capabilities.weather_base_url, "http://localhost:9000");

    assert_eq!(config.pipeline.plan_timeout_secs, 12);
    assert_eq!(config.pipeline.synthesis_timeout_secs, 40);
    assert_eq!(config.memory.backend, MemoryBackend::Memory);
    assert_eq!(config.memory.max_recall_records, 5);
}

#[test]
fn test_minimal_config_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        &format!(
            "[core]\ndata_dir = {:?}\n",
            dir.path().join("d").to_str().unwrap()
        ),
    );

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.llm.default_provider, "ollama");
    assert_eq!(config.capabilities.default_plan, vec!["search"]);
    assert_eq!(config.memory.backend, MemoryBackend::Sqlite);
    assert!(config.database_path().ends_with("concierge.db"));
}

#[test]
fn test_invalid_values_are_config_errors() {
    let cases = [
        "[core]\nlog_level = \"verbose\"\n",
        "[llm]\ndefault_provider = \"gemini\"\n",
        "[llm]\nsensitivity_threshold = 1.5\n",
        "[llm]\nretry_budget = 0\n",
        "[capabilities]\ndefault_plan = []\n",
        "[pipeline]\nclarity_timeout_secs = 0\n",
        "[memory]\nbackend = \"redis\"\n",
    ];

    for body in cases {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, body);
        let err = Config::load_from_path(&path).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)), "{} -> {:?}", body, err);
    }
}

#[test]
fn test_load_or_create_writes_default_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    // The default data_dir lives under $HOME; only the file itself is checked here
    let written = Config::load_or_create_at(&path);
    assert!(path.exists());

    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("[capabilities]"));
    assert!(contents.contains("default_plan"));
    assert!(contents.contains("\"search\""));
    if let Ok(config) = written {
        assert_eq!(config.core.default_session, "default");
    }
}
