//! Configuration loading, validation, and management for Mnemos.
//!
//! Loads configuration from `~/.mnemos/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use mnemos_core::memory::Language;
use mnemos_core::store::StoreLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.mnemos/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model used for roleplay completions
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Temperature for roleplay completions
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Max tokens per completion (must leave room for the sidecar)
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Override the provider base URL (proxies, tests)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Memory tiers and retrieval
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Compression trigger and limits
    #[serde(default)]
    pub compression: CompressionConfig,

    /// Retry policy for oracle calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Session persistence
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Default profiles for new sessions
    #[serde(default)]
    pub profiles: ProfileConfig,
}

fn default_provider() -> String {
    "anthropic".into()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_temperature() -> f32 {
    0.8
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
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("base_url", &self.base_url)
            .field("memory", &self.memory)
            .field("compression", &self.compression)
            .field("retry", &self.retry)
            .field("persistence", &self.persistence)
            .field("profiles", &self.profiles)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_short_term_capacity")]
    pub short_term_capacity: usize,

    /// Unredacted turns kept verbatim
    #[serde(default = "default_detailed_capacity")]
    pub detailed_capacity: usize,

    /// Long-term items injected per turn
    #[serde(default = "default_max_retrieved_items")]
    pub max_retrieved_items: usize,

    /// Token budget for the assembled prompt
    #[serde(default = "default_context_token_budget")]
    pub context_token_budget: usize,

    /// Language of new sessions (selects keyword tables)
    #[serde(default)]
    pub language: Language,
}

fn default_short_term_capacity() -> usize {
    10
}
fn default_detailed_capacity() -> usize {
    2
}
fn default_max_retrieved_items() -> usize {
    12
}
fn default_context_token_budget() -> usize {
    8192
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_capacity: default_short_term_capacity(),
            detailed_capacity: default_detailed_capacity(),
            max_retrieved_items: default_max_retrieved_items(),
            context_token_budget: default_context_token_budget(),
            language: Language::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Counted calls required before compression is considered
    #[serde(default = "default_frequency")]
    pub frequency: u32,

    /// Long-term size that must be exceeded before compression runs
    #[serde(default = "default_threshold")]
    pub threshold: usize,

    /// Profiles larger than this are compressed a second time
    #[serde(default = "default_profile_byte_limit")]
    pub profile_byte_limit: usize,

    /// Model for consolidation calls (defaults to `default_model`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_compression_max_tokens")]
    pub max_tokens: u32,
}

fn default_true() -> bool {
    true
}
fn default_frequency() -> u32 {
    10
}
fn default_threshold() -> usize {
    8
}
fn default_profile_byte_limit() -> usize {
    3096
}
fn default_compression_max_tokens() -> u32 {
    2048
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: default_frequency(),
            threshold: default_threshold(),
            profile_byte_limit: default_profile_byte_limit(),
            model: None,
            max_tokens: default_compression_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt, only on "overloaded"
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay; doubled on each retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// "file" or "memory"
    #[serde(default = "default_persistence_backend")]
    pub backend: String,

    /// Where session snapshots live (defaults to `~/.mnemos/sessions`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Sessions kept in the in-process LRU cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_persistence_backend() -> String {
    "file".into()
}
fn default_cache_capacity() -> usize {
    64
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: default_persistence_backend(),
            data_dir: None,
            cache_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub character_profile: String,

    #[serde(default)]
    pub user_profile: String,
}

impl AppConfig {
    /// Load configuration from the default location (`~/.mnemos/config.toml`).
    ///
    /// Falls back to defaults if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("MNEMOS_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("MNEMOS_MODEL") {
            self.default_model = model;
        }

        if let Ok(dir) = std::env::var("MNEMOS_DATA_DIR") {
            self.persistence.data_dir = Some(PathBuf::from(dir));
        }
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
        dirs_home().join(".mnemos")
    }

    /// Directory for session snapshots.
    pub fn sessions_dir(&self) -> PathBuf {
        self.persistence
            .data_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("sessions"))
    }

    /// Memory store limits for new and loaded sessions.
    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            short_term_capacity: self.memory.short_term_capacity,
            detailed_capacity: self.memory.detailed_capacity,
            compression_enabled: self.compression.enabled,
        }
    }

    /// Model used for consolidation calls.
    pub fn compression_model(&self) -> &str {
        self.compression
            .model
            .as_deref()
            .unwrap_or(&self.default_model)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 1.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 1.0".into(),
            ));
        }

        if self.memory.short_term_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "memory.short_term_capacity must be > 0".into(),
            ));
        }

        if self.memory.max_retrieved_items == 0 {
            return Err(ConfigError::ValidationError(
                "memory.max_retrieved_items must be > 0".into(),
            ));
        }

        if self.compression.frequency == 0 {
            return Err(ConfigError::ValidationError(
                "compression.frequency must be > 0".into(),
            ));
        }

        if self.persistence.cache_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "persistence.cache_capacity must be > 0".into(),
            ));
        }

        if !matches!(self.persistence.backend.as_str(), "file" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown persistence backend '{}' (expected 'file' or 'memory')",
                self.persistence.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            base_url: None,
            memory: MemoryConfig::default(),
            compression: CompressionConfig::default(),
            retry: RetryConfig::default(),
            persistence: PersistenceConfig::default(),
            profiles: ProfileConfig::default(),
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
