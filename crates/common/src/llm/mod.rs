//! Text generation service abstraction
//!
//! One operation: given an instruction and an input, return generated
//! text. Providers:
//! - OpenAI Responses API (`/v1/responses`)
//! - Echo generator for local development
//! - Scripted generator for tests

mod openai;

pub use openai::OpenAIResponsesClient;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};

/// Text produced by the service; may be empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
}

impl Generation {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Failure of a single text service call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    #[error("quota exhausted: {message}")]
    QuotaExhausted { message: String },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("service returned nothing usable")]
    Empty,

    #[error("transport failure: {message}")]
    Transport { message: String },

    #[error("{message}")]
    Other { status: Option<u16>, message: String },
}

impl GenerationError {
    /// Rate limits, empty output and transport hiccups are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::RateLimited { .. }
                | GenerationError::Empty
                | GenerationError::Transport { .. }
        )
    }

    /// Short label used in metrics
    pub fn label(&self) -> &'static str {
        match self {
            GenerationError::RateLimited { .. } => "rate_limited",
            GenerationError::QuotaExhausted { .. } => "quota_exhausted",
            GenerationError::Unauthorized { .. } => "unauthorized",
            GenerationError::Empty => "empty",
            GenerationError::Transport { .. } => "transport",
            GenerationError::Other { .. } => "other",
        }
    }
}

/// Trait for text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run one generation; no retries at this level
    async fn generate(
        &self,
        instruction: &str,
        input: &str,
    ) -> std::result::Result<Generation, GenerationError>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Development generator that echoes the input back
pub struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(
        &self,
        _instruction: &str,
        input: &str,
    ) -> std::result::Result<Generation, GenerationError> {
        Ok(Generation::new(input.trim()))
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

/// Generator that replays queued results, then echoes.
///
/// Records every `(instruction, input)` pair it receives.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<std::result::Result<Generation, GenerationError>>>,
    calls: Mutex<Vec<(String, String)>>,
    call_count: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue results to hand out in order
    pub fn with_script<I>(results: I) -> Self
    where
        I: IntoIterator<Item = std::result::Result<Generation, GenerationError>>,
    {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Queue a successful generation
    pub async fn push_text(&self, text: &str) {
        self.script.lock().await.push_back(Ok(Generation::new(text)));
    }

    /// Queue a failure
    pub async fn push_error(&self, err: GenerationError) {
        self.script.lock().await.push_back(Err(err));
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub async fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        instruction: &str,
        input: &str,
    ) -> std::result::Result<Generation, GenerationError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .await
            .push((instruction.to_string(), input.to_string()));

        match self.script.lock().await.pop_front() {
            Some(result) => result,
            None => Ok(Generation::new(input.trim())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Create a generator based on configuration
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| AppError::Configuration {
                    message: "OpenAI API key required".to_string(),
                })?;
            Ok(Arc::new(OpenAIResponsesClient::new(key, config)?))
        }
        "mock" => {
            tracing::warn!("Using echo text generator");
            Ok(Arc::new(EchoGenerator))
        }
        other => Err(AppError::Configuration {
            message: format!("unknown llm.provider '{}'", other),
        }),
    }
}
