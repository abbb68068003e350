//! Configuration loading, validation, and management for Stepwise.
//!
//! Loads configuration from `~/.stepwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use stepwise_core::agent::{AgentSettings, DEFAULT_SYSTEM_PROMPT};

/// Context store backends `open_store` knows how to build.
pub const CONTEXT_BACKENDS: [&str; 2] = ["sqlite", "memory"];

/// The root configuration structure.
///
/// Maps directly to `~/.stepwise/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Model name sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response (unset = provider default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Ask for human input after every turn
    #[serde(default)]
    pub collaboration: bool,

    /// Context store configuration
    #[serde(default)]
    pub context: ContextConfig,

    /// Agent loop configuration
    #[serde(default)]
    pub agent: AgentConfig,
}

fn default_api_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_temperature() -> f32 {
    0.7
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_base_url", &self.api_base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("collaboration", &self.collaboration)
            .field("context", &self.context)
            .field("agent", &self.agent)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_context_backend")]
    pub backend: String,

    /// Database file (or `sqlite:` URL) for the sqlite backend
    #[serde(default = "default_context_path")]
    pub path: String,
}

fn default_context_backend() -> String {
    "sqlite".into()
}
fn default_context_path() -> String {
    "context.db".into()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            backend: default_context_backend(),
            path: default_context_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// How many recent entries go into each prompt (unset = all)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_limit: Option<usize>,

    /// Safety limit on turns per run (unset = until the model stops)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,

    /// Deadline in seconds for each model response and tool call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_timeout_secs: Option<u64>,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            context_limit: None,
            max_turns: None,
            turn_timeout_secs: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.stepwise/config.toml),
    /// then apply environment overrides.
    ///
    /// Each setting checks its `STEPWISE_*` variable first, then the
    /// conventional name:
    /// - `STEPWISE_MODEL` / `OPENAI_MODEL`
    /// - `STEPWISE_API_KEY` / `OPENAI_API_KEY`
    /// - `STEPWISE_API_BASE_URL` / `OPENAI_API_BASE_URL`
    /// - `STEPWISE_COLLABORATION` / `COLLABORATION`
    /// - `STEPWISE_CONTEXT_DB_PATH` / `CONTEXT_DB_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |primary: &str, fallback: &str| {
            lookup(primary)
                .or_else(|| lookup(fallback))
                .filter(|v| !v.is_empty())
        };

        if let Some(model) = var("STEPWISE_MODEL", "OPENAI_MODEL") {
            self.model = model;
        }
        if let Some(key) = var("STEPWISE_API_KEY", "OPENAI_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(url) = var("STEPWISE_API_BASE_URL", "OPENAI_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(flag) = var("STEPWISE_COLLABORATION", "COLLABORATION") {
            self.collaboration = parse_flag(&flag);
        }
        if let Some(path) = var("STEPWISE_CONTEXT_DB_PATH", "CONTEXT_DB_PATH") {
            self.context.path = path;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stepwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        if !CONTEXT_BACKENDS.contains(&self.context.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "context.backend must be one of {}, got '{}'",
                CONTEXT_BACKENDS.join(", "),
                self.context.backend
            )));
        }

        if self.context.backend == "sqlite" && self.context.path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "context.path must not be empty for the sqlite backend".into(),
            ));
        }

        if self.agent.context_limit == Some(0) {
            return Err(ConfigError::ValidationError("agent.context_limit must be > 0".into()));
        }
        if self.agent.max_turns == Some(0) {
            return Err(ConfigError::ValidationError("agent.max_turns must be > 0".into()));
        }
        if self.agent.turn_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "agent.turn_timeout_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The settings the agent controller runs with.
    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            model: self.model.clone(),
            system_prompt: self.agent.system_prompt.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            collaboration: self.collaboration,
            max_turns: self.agent.max_turns,
            turn_timeout: self.agent.turn_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: default_api_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            collaboration: false,
            context: ContextConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

/// "true", "1", "yes", and "on" (any case) enable a flag; anything else disables it.
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
