//! Configuration loading, validation, and management for Loreloom.
//!
//! Loads configuration from `~/.loreloom/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.loreloom/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Data root holding conversations and asset directories
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Identifier for this pipeline instance; part of the delta cache key
    #[serde(default = "default_router_id")]
    pub router_id: String,

    /// Pipeline behavior
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Delta fingerprint cache
    #[serde(default)]
    pub delta: DeltaConfig,

    /// LLM dispatch settings
    #[serde(default)]
    pub llm: LlmConfig,
}

fn default_data_dir() -> PathBuf {
    dirs_home().join(".loreloom")
}
fn default_router_id() -> String {
    "default".into()
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
            .field("data_dir", &self.data_dir)
            .field("router_id", &self.router_id)
            .field("pipeline", &self.pipeline)
            .field("delta", &self.delta)
            .field("llm", &self.llm)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Hard timeout for macro/condition interpreter calls, in seconds.
    /// Timeouts fail closed: conditions evaluate false, expansion no-ops.
    #[serde(default = "default_macro_timeout")]
    pub macro_timeout_secs: u64,

    /// View used when a request doesn't name one: "user_view" or
    /// "assistant_view"
    #[serde(default = "default_view")]
    pub default_view: String,
}

fn default_macro_timeout() -> u64 {
    5
}
fn default_view() -> String {
    "assistant_view".into()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            macro_timeout_secs: default_macro_timeout(),
            default_view: default_view(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaConfig {
    /// Maximum cached (file, view, router) fingerprint entries
    #[serde(default = "default_delta_capacity")]
    pub capacity: usize,

    /// Idle seconds before an entry expires
    #[serde(default = "default_delta_ttl")]
    pub ttl_secs: u64,
}

fn default_delta_capacity() -> usize {
    1024
}
fn default_delta_ttl() -> u64 {
    30 * 60
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            capacity: default_delta_capacity(),
            ttl_secs: default_delta_ttl(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.loreloom/config.toml).
    ///
    /// Environment variable overrides:
    /// - `LORELOOM_API_KEY`
    /// - `LORELOOM_MODEL`
    /// - `LORELOOM_DATA_DIR`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.llm.api_key.is_none() {
            config.llm.api_key = std::env::var("LORELOOM_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok());
        }
        if let Ok(model) = std::env::var("LORELOOM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(dir) = std::env::var("LORELOOM_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".loreloom")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.temperature < 0.0 || self.llm.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.delta.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "delta.capacity must be at least 1".into(),
            ));
        }
        if self.pipeline.macro_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.macro_timeout_secs must be at least 1".into(),
            ));
        }
        if !matches!(
            self.pipeline.default_view.as_str(),
            "user_view" | "assistant_view"
        ) {
            return Err(ConfigError::ValidationError(format!(
                "pipeline.default_view must be user_view or assistant_view, got '{}'",
                self.pipeline.default_view
            )));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            router_id: default_router_id(),
            pipeline: PipelineConfig::default(),
            delta: DeltaConfig::default(),
            llm: LlmConfig::default(),
        }
    }
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
