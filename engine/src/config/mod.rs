//! Configuration management
//!
//! Loads, validates and creates the Concierge configuration, stored as TOML
//! at `~/.concierge/config.toml` unless a path is given explicitly.
//!
//! # Configuration Sections
//!
//! - **core**: log level, data directory, default session
//! - **llm**: provider preference, routing thresholds, timeouts, retry budget
//! - **capabilities**: built-in capability flags, endpoints, default plan
//! - **pipeline**: per-stage time bounds for the coordinator
//! - **memory**: store backend and recall limits
//!
//! Every section and field has a default, so a partial file is valid.
//!
//! # Examples
//!
//! ```no_run
//! use concierge_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Default provider: {}", config.llm.default_provider);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub llm: LLMConfig,

    #[serde(default)]
    pub capabilities: CapabilitiesConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Session identifier used when the caller supplies none
    #[serde(default = "default_session")]
    pub default_session: String,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Preferred provider (ollama, openai, anthropic, nvidia_nim)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Sensitivity above which local providers are preferred (0.0-1.0)
    #[serde(default = "default_sensitivity_threshold")]
    pub sensitivity_threshold: f64,

    /// Complexity above which cloud providers are preferred (0.0-1.0)
    #[serde(default = "default_complexity_threshold")]
    pub complexity_threshold: f64,

    /// Time bound for a single provider attempt
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Passes over the ranked provider list before giving up
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub openai: OpenAIConfig,

    #[serde(default)]
    pub anthropic: AnthropicConfig,

    #[serde(default)]
    pub nvidia_nim: NvidiaNimConfig,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// OpenAI provider configuration. The API key lives in the environment or keychain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_openai_model")]
    pub model: String,
}

/// Anthropic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    #[serde(default = "default_anthropic_model")]
    pub model: String,
}

/// NVIDIA NIM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NvidiaNimConfig {
    #[serde(default = "default_nvidia_nim_base_url")]
    pub base_url: String,

    #[serde(default = "default_nvidia_nim_model")]
    pub model: String,
}

/// Built-in capability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    #[serde(default = "default_true")]
    pub search: bool,

    #[serde(default = "default_true")]
    pub weather: bool,

    #[serde(default = "default_true")]
    pub greeting: bool,

    #[serde(default = "default_true")]
    pub memory: bool,

    /// Time bound for a single capability invocation
    #[serde(default = "default_capability_timeout")]
    pub timeout_secs: u64,

    /// Plan used when the planner produces nothing usable
    #[serde(default = "default_plan")]
    pub default_plan: Vec<String>,

    /// User-Agent sent to public APIs (Nominatim and NWS require one)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_wikipedia_base_url")]
    pub wikipedia_base_url: String,

    #[serde(default = "default_nominatim_base_url")]
    pub nominatim_base_url: String,

    /// US National Weather Service API
    #[serde(default = "default_weather_base_url")]
    pub weather_base_url: String,

    /// Global forecast API used outside the NWS coverage area
    #[serde(default = "default_open_meteo_base_url")]
    pub open_meteo_base_url: String,
}

/// Per-stage time bounds for the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_stage_timeout")]
    pub recall_timeout_secs: u64,

    #[serde(default = "default_stage_timeout")]
    pub store_decision_timeout_secs: u64,

    #[serde(default = "default_stage_timeout")]
    pub clarity_timeout_secs: u64,

    #[serde(default = "default_stage_timeout")]
    pub plan_timeout_secs: u64,

    #[serde(default = "default_synthesis_timeout")]
    pub synthesis_timeout_secs: u64,

    #[serde(default = "default_stage_timeout")]
    pub clarify_timeout_secs: u64,
}

/// Where session memories are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    Sqlite,
    Memory,
}

/// Memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_backend")]
    pub backend: MemoryBackend,

    /// Most recent records considered during recall
    #[serde(default = "default_max_recall_records")]
    pub max_recall_records: usize,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.concierge")
}

fn default_session() -> String {
    "default".to_string()
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_sensitivity_threshold() -> f64 {
    0.7
}

fn default_complexity_threshold() -> f64 {
    0.8
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_retry_budget() -> u32 {
    1
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_nvidia_nim_base_url() -> String {
    "https://integrate.api.nvidia.com/v1".to_string()
}

fn default_nvidia_nim_model() -> String {
    "meta/llama-3.1-70b-instruct".to_string()
}

fn default_capability_timeout() -> u64 {
    20
}

fn default_plan() -> Vec<String> {
    vec!["search".to_string()]
}

fn default_user_agent() -> String {
    format!("concierge/{}", env!("CARGO_PKG_VERSION"))
}

fn default_wikipedia_base_url() -> String {
    "https://en.wikipedia.org".to_string()
}

fn default_nominatim_base_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_weather_base_url() -> String {
    "https://api.weather.gov".to_string()
}

fn default_open_meteo_base_url() -> String {
    "https://api.open-meteo.com".to_string()
}

fn default_stage_timeout() -> u64 {
    30
}

fn default_synthesis_timeout() -> u64 {
    60
}

fn default_memory_backend() -> MemoryBackend {
    MemoryBackend::Sqlite
}

fn default_max_recall_records() -> usize {
    50
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            default_session: default_session(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            sensitivity_threshold: default_sensitivity_threshold(),
            complexity_threshold: default_complexity_threshold(),
            timeout_secs: default_llm_timeout(),
            retry_budget: default_retry_budget(),
            ollama: OllamaConfig::default(),
            openai: OpenAIConfig::default(),
            anthropic: AnthropicConfig::default(),
            nvidia_nim: NvidiaNimConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            model: default_anthropic_model(),
        }
    }
}

impl Default for NvidiaNimConfig {
    fn default() -> Self {
        Self {
            base_url: default_nvidia_nim_base_url(),
            model: default_nvidia_nim_model(),
        }
    }
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            search: true,
            weather: true,
            greeting: true,
            memory: true,
            timeout_secs: default_capability_timeout(),
            default_plan: default_plan(),
            user_agent: default_user_agent(),
            wikipedia_base_url: default_wikipedia_base_url(),
            nominatim_base_url: default_nominatim_base_url(),
            weather_base_url: default_weather_base_url(),
            open_meteo_base_url: default_open_meteo_base_url(),
        }
    }
}

impl CapabilitiesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recall_timeout_secs: default_stage_timeout(),
            store_decision_timeout_secs: default_stage_timeout(),
            clarity_timeout_secs: default_stage_timeout(),
            plan_timeout_secs: default_stage_timeout(),
            synthesis_timeout_secs: default_synthesis_timeout(),
            clarify_timeout_secs: default_stage_timeout(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            max_recall_records: default_max_recall_records(),
        }
    }
}

impl Config {
    /// Load configuration from `~/.concierge/config.toml`, writing a default
    /// file first if none exists.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Same as `load_or_create`, for an explicit path
    pub fn load_or_create_at(path: &Path) -> Result<Self, EngineError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Load and validate configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default();

        // Written before processing so the file keeps the portable `~` form
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Created default configuration at {}", path.display());

        config.validate_and_process()?;
        Ok(config)
    }

    /// `~/.concierge/config.toml`
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".concierge").join("config.toml"))
    }

    /// SQLite database file inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("concierge.db")
    }

    /// Validate fields, normalise the default plan, expand and create the data directory
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        self.validate()?;

        self.capabilities.default_plan = self
            .capabilities
            .default_plan
            .iter()
            .map(|name| name.trim().to_lowercase())
            .collect();

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }
        self.core.data_dir = self
            .core
            .data_dir
            .canonicalize()
            .map_err(|e| EngineError::PathCanonicalization(self.core.data_dir.clone(), e.to_string()))?;

        Ok(())
    }

    /// Field checks that do not touch the filesystem
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.core.default_session.trim().is_empty() {
            return Err(EngineError::Config(
                "default_session must not be empty".to_string(),
            ));
        }

        let valid_providers = ["ollama", "openai", "anthropic", "nvidia_nim"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        if !(0.0..=1.0).contains(&self.llm.sensitivity_threshold) {
            return Err(EngineError::Config(
                "sensitivity_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.llm.complexity_threshold) {
            return Err(EngineError::Config(
                "complexity_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.llm.retry_budget == 0 {
            return Err(EngineError::Config(
                "retry_budget must be at least 1".to_string(),
            ));
        }

        let timeouts = [
            ("llm.timeout_secs", self.llm.timeout_secs),
            ("capabilities.timeout_secs", self.capabilities.timeout_secs),
            ("pipeline.recall_timeout_secs", self.pipeline.recall_timeout_secs),
            (
                "pipeline.store_decision_timeout_secs",
                self.pipeline.store_decision_timeout_secs,
            ),
            ("pipeline.clarity_timeout_secs", self.pipeline.clarity_timeout_secs),
            ("pipeline.plan_timeout_secs", self.pipeline.plan_timeout_secs),
            ("pipeline.synthesis_timeout_secs", self.pipeline.synthesis_timeout_secs),
            ("pipeline.clarify_timeout_secs", self.pipeline.clarify_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(EngineError::Config(format!("{} must be greater than 0", name)));
        }

        if self.capabilities.default_plan.is_empty() {
            return Err(EngineError::Config(
                "capabilities.default_plan must name at least one capability".to_string(),
            ));
        }
        if self
            .capabilities
            .default_plan
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err(EngineError::Config(
                "capabilities.default_plan contains an empty name".to_string(),
            ));
        }

        if self.memory.max_recall_records == 0 {
            return Err(EngineError::Config(
                "memory.max_recall_records must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
