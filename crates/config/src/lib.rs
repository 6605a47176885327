//! Configuration loading, validation, and management for Ponder.
//!
//! Loads configuration from `~/.ponder/config.toml` with environment
//! variable overrides. Every field has a default, so a missing file is a
//! valid (default) configuration. Settings are validated at load time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ponder/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model gateway backend ("openrouter", "openai", "ollama", ...)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Override the backend's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Reasoning loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool dispatch settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Circuit breaker policies
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
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
            .field("default_provider", &self.default_provider)
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .field("resilience", &self.resilience)
            .field("logging", &self.logging)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Iteration budget per task
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Upper bound on a single model gateway call
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,

    /// Consult and populate the in-process result cache
    #[serde(default)]
    pub cache_results: bool,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_gateway_timeout_secs() -> u64 {
    120
}
fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            cache_results: false,
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Ceiling on any single tool attempt; lower descriptor timeouts win
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Retry delay before retry `n` is `backoff_unit_ms * 2^n`
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
}

fn default_max_timeout_ms() -> u64 {
    30_000
}
fn default_backoff_unit_ms() -> u64 {
    1_000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_timeout_ms: default_max_timeout_ms(),
            backoff_unit_ms: default_backoff_unit_ms(),
        }
    }
}

/// Breaker policy for one capability category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time spent open before a half-open trial is allowed
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Optional failure ratio (0, 1] that also opens the circuit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_rate: Option<f64>,

    /// Rolling window the failure ratio is measured over
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Calls required in the window before the ratio is considered
    #[serde(default = "default_min_calls")]
    pub min_calls: u32,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_cooldown_secs() -> u64 {
    30
}
fn default_window_secs() -> u64 {
    60
}
fn default_min_calls() -> u32 {
    10
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
            failure_rate: None,
            window_secs: default_window_secs(),
            min_calls: default_min_calls(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Policy for categories without an explicit entry
    #[serde(default)]
    pub default: BreakerConfig,

    /// Per-category overrides, keyed by tool category
    #[serde(default)]
    pub categories: HashMap<String, BreakerConfig>,
}

impl ResilienceConfig {
    /// The effective policy for `category`.
    pub fn for_category(&self, category: &str) -> &BreakerConfig {
        self.categories.get(category).unwrap_or(&self.default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
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

    /// Environment variables take priority over the file.
    fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("PONDER_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }
        if let Ok(provider) = std::env::var("PONDER_PROVIDER") {
            self.default_provider = provider;
        }
        if let Ok(model) = std::env::var("PONDER_MODEL") {
            self.default_model = model;
        }
        if let Ok(url) = std::env::var("PONDER_API_URL") {
            self.api_url = Some(url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ponder")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.gateway_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.gateway_timeout_secs must be at least 1".into(),
            ));
        }

        if self.tools.max_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "tools.max_timeout_ms must be at least 1".into(),
            ));
        }

        let breakers = std::iter::once(("default", &self.resilience.default)).chain(
            self.resilience
                .categories
                .iter()
                .map(|(name, cfg)| (name.as_str(), cfg)),
        );
        for (name, breaker) in breakers {
            if breaker.failure_threshold == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "resilience '{name}': failure_threshold must be at least 1"
                )));
            }
            if let Some(rate) = breaker.failure_rate
                && !(rate > 0.0 && rate <= 1.0)
            {
                return Err(ConfigError::ValidationError(format!(
                    "resilience '{name}': failure_rate must be in (0.0, 1.0]"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            api_url: None,
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            tools: ToolsConfig::default(),
            resilience: ResilienceConfig::default(),
            logging: LoggingConfig::default(),
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
