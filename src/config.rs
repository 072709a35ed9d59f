//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, bot tokens) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use crate::types::QuorumError;

/// `tracing` filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "quorum=info";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    pub participants: Vec<ParticipantConfig>,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

/// Debate loop parameters handed to the coordinator.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Minimum normalized confidence that ends the debate early.
    #[serde(default = "default_threshold")]
    pub consensus_threshold: f64,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Per-call budget for each `analyze` / `revise` invocation.
    #[serde(default = "default_participant_timeout")]
    pub participant_timeout_secs: u64,
    /// Outer budget for the whole session.
    #[serde(default = "default_session_deadline")]
    pub session_deadline_secs: u64,
}

fn default_threshold() -> f64 {
    0.70
}

fn default_max_rounds() -> usize {
    5
}

fn default_participant_timeout() -> u64 {
    60
}

fn default_session_deadline() -> u64 {
    300
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            consensus_threshold: default_threshold(),
            max_rounds: default_max_rounds(),
            participant_timeout_secs: default_participant_timeout(),
            session_deadline_secs: default_session_deadline(),
        }
    }
}

impl EngineConfig {
    pub fn participant_timeout(&self) -> Duration {
        Duration::from_secs(self.participant_timeout_secs)
    }

    pub fn session_deadline(&self) -> Duration {
        Duration::from_secs(self.session_deadline_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParticipantConfig {
    /// "openai" | "grok" | "gemini" | "rules"
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub model: String,
    pub role: String,
    pub weight: f64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Env var holding the provider API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Override for the provider's chat completions base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f64 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// "coingecko" | "simulated"
    #[serde(default = "default_data_provider")]
    pub provider: String,
    #[serde(default)]
    pub news_api_key_env: Option<String>,
    #[serde(default)]
    pub coingecko_api_key_env: Option<String>,
}

fn default_data_provider() -> String {
    "simulated".to_string()
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            provider: default_data_provider(),
            news_api_key_env: None,
            coingecko_api_key_env: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_short_term_ttl")]
    pub short_term_ttl_secs: u64,
    #[serde(default = "default_long_term_path")]
    pub long_term_path: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

fn default_short_term_ttl() -> u64 {
    3600
}

fn default_long_term_path() -> String {
    "memory/vector_store.json".to_string()
}

fn default_top_k() -> usize {
    3
}

fn default_dimension() -> usize {
    768
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            short_term_ttl_secs: default_short_term_ttl(),
            long_term_path: default_long_term_path(),
            top_k: default_top_k(),
            dimension: default_dimension(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
    #[serde(default = "default_threshold")]
    pub min_confidence: f64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token_env: None,
            telegram_chat_id_env: None,
            min_confidence: default_threshold(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run safely.
    pub fn validate(&self) -> Result<(), QuorumError> {
        let engine = &self.engine;
        if !(0.0..=1.0).contains(&engine.consensus_threshold) {
            return Err(QuorumError::Config(format!(
                "consensus_threshold must be within [0, 1], got {}",
                engine.consensus_threshold
            )));
        }
        if engine.max_rounds == 0 {
            return Err(QuorumError::Config("max_rounds must be at least 1".into()));
        }
        if engine.participant_timeout_secs == 0 || engine.session_deadline_secs == 0 {
            return Err(QuorumError::Config("timeouts must be non-zero".into()));
        }

        let mut names = HashSet::new();
        for p in &self.participants {
            if !(p.weight.is_finite() && p.weight > 0.0) {
                return Err(QuorumError::Config(format!(
                    "participant '{}' weight must be positive, got {}",
                    p.name, p.weight
                )));
            }
            if !(0.0..=2.0).contains(&p.temperature) {
                return Err(QuorumError::Config(format!(
                    "participant '{}' temperature must be within [0, 2], got {}",
                    p.name, p.temperature
                )));
            }
            if !names.insert(p.name.as_str()) {
                return Err(QuorumError::Config(format!(
                    "duplicate participant name '{}'",
                    p.name
                )));
            }
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve an optional env-var reference, treating unset or empty as absent.
    pub fn resolve_optional(env_name: Option<&str>) -> Option<String> {
        env_name
            .and_then(|name| Self::resolve_env(name).ok())
            .filter(|v| !v.trim().is_empty())
    }
}
