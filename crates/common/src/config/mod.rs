//! Configuration management for IdeaForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values
//!
//! `OPENAI_API_KEY` is honoured when `llm.api_key` is not set.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{AppError, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Store backend selection
    pub store: StoreConfig,

    /// Text generation service configuration
    pub llm: LlmConfig,

    /// Submission pipeline configuration
    pub pipeline: PipelineConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply the bundled schema on startup
    #[serde(default = "default_enabled")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Store backend: postgres, memory
    #[serde(default = "default_store_backend")]
    pub backend: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Text service provider: openai, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API key for the text service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Reasoning effort hint (omitted when unset)
    #[serde(default = "default_reasoning_effort")]
    pub reasoning_effort: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts per text service call
    #[serde(default = "default_llm_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Submission strategy: fragments, combine
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Maximum idea length in characters
    #[serde(default = "default_max_idea_chars")]
    pub max_idea_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 240 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_database_url() -> String { "postgres://localhost/ideaforge".to_string() }
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_store_backend() -> String { "postgres".to_string() }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_model() -> String { crate::DEFAULT_TEXT_MODEL.to_string() }
fn default_reasoning_effort() -> Option<String> { Some("low".to_string()) }
fn default_llm_timeout() -> u64 { 60 }
fn default_llm_attempts() -> u32 { 3 }
fn default_backoff_base() -> u64 { 1000 }
fn default_strategy() -> String { "fragments".to_string() }
fn default_max_idea_chars() -> usize { 2000 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

/// Which orchestration `POST /submissions` runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStrategy {
    /// Transform each idea into a fragment and append it if new
    Fragments,
    /// Combine every stored idea into one prompt, returned transiently
    Combine,
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        let mut loaded: Self = config.try_deserialize()?;
        loaded.apply_env_fallbacks();
        Ok(loaded)
    }

    fn apply_env_fallbacks(&mut self) {
        if self.llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            self.llm.api_key = std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty());
        }
    }

    /// Reject settings that would only fail later, at request time
    pub fn validate(&self) -> Result<()> {
        match self.llm.provider.as_str() {
            "openai" => {
                let has_key = self.llm.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
                if !has_key {
                    return Err(AppError::Configuration {
                        message: "llm.api_key (or OPENAI_API_KEY) is required for the openai provider".to_string(),
                    });
                }
            }
            "mock" => {}
            other => {
                return Err(AppError::Configuration {
                    message: format!("unknown llm.provider '{}'", other),
                });
            }
        }

        if !matches!(self.store.backend.as_str(), "postgres" | "memory") {
            return Err(AppError::Configuration {
                message: format!("unknown store.backend '{}'", self.store.backend),
            });
        }

        if self.llm.max_attempts == 0 {
            return Err(AppError::Configuration {
                message: "llm.max_attempts must be at least 1".to_string(),
            });
        }

        if self.pipeline.max_idea_chars == 0 {
            return Err(AppError::Configuration {
                message: "pipeline.max_idea_chars must be at least 1".to_string(),
            });
        }

        self.submission_strategy().map(|_| ())
    }

    /// Parsed `pipeline.strategy`
    pub fn submission_strategy(&self) -> Result<SubmissionStrategy> {
        match self.pipeline.strategy.as_str() {
            "fragments" => Ok(SubmissionStrategy::Fragments),
            "combine" => Ok(SubmissionStrategy::Combine),
            other => Err(AppError::Configuration {
                message: format!("unknown pipeline.strategy '{}'", other),
            }),
        }
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Base delay of the text service backoff
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.llm.backoff_base_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: default_enabled(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { backend: default_store_backend() }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            api_base: None,
            model: default_llm_model(),
            reasoning_effort: default_reasoning_effort(),
            timeout_secs: default_llm_timeout(),
            max_attempts: default_llm_attempts(),
            backoff_base_ms: default_backoff_base(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            max_idea_chars: default_max_idea_chars(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}
