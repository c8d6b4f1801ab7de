//! OpenAI Responses API client

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Generation, GenerationError, TextGenerator};
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Error codes/types that mean the account is out of credit
const QUOTA_CODES: &[&str] = &["insufficient_quota", "billing_hard_limit_reached"];

/// OpenAI text generation client
pub struct OpenAIResponsesClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    reasoning_effort: Option<String>,
    base_url: String,
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<Reasoning<'a>>,
}

#[derive(Serialize)]
struct Reasoning<'a> {
    effort: &'a str,
}

#[derive(Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl ResponsesResponse {
    /// Concatenate every `output_text` part of every message item
    fn into_text(self) -> String {
        if let Some(text) = self.output_text.filter(|t| !t.trim().is_empty()) {
            return text;
        }

        self.output
            .into_iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content)
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("")
    }
}

impl OpenAIResponsesClient {
    /// Create a new client
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            model: config.model.clone(),
            reasoning_effort: config
                .reasoning_effort
                .clone()
                .filter(|effort| !effort.trim().is_empty()),
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAIResponsesClient {
    async fn generate(
        &self,
        instruction: &str,
        input: &str,
    ) -> std::result::Result<Generation, GenerationError> {
        let url = format!("{}/responses", self.base_url);

        let request = ResponsesRequest {
            model: &self.model,
            instructions: instruction,
            input,
            reasoning: self
                .reasoning_effort
                .as_deref()
                .map(|effort| Reasoning { effort }),
        };

        let response = self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Transport {
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let parsed: ResponsesResponse = response.json().await.map_err(|e| {
            GenerationError::Other {
                status: Some(status.as_u16()),
                message: format!("Failed to parse response: {}", e),
            }
        })?;

        Ok(Generation::new(parsed.into_text().trim()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Map a non-success HTTP response onto the retry-relevant error kinds
pub fn classify_failure(status: StatusCode, body: &str) -> GenerationError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);

    let message = match &parsed {
        Some(err) if !err.message.is_empty() => err.message.clone(),
        _ if body.trim().is_empty() => status.to_string(),
        _ => body.trim().to_string(),
    };

    // Structured code/type wins; rate-limit messages can mention billing too
    let signals_quota = match parsed.as_ref() {
        Some(err) if err.code.is_some() || err.kind.is_some() => {
            [err.code.as_deref(), err.kind.as_deref()]
                .into_iter()
                .flatten()
                .any(|s| QUOTA_CODES.contains(&s))
        }
        _ => {
            let lower = message.to_lowercase();
            lower.contains("quota") || lower.contains("billing")
        }
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::Unauthorized { message },
        StatusCode::PAYMENT_REQUIRED => GenerationError::QuotaExhausted { message },
        StatusCode::TOO_MANY_REQUESTS if signals_quota => GenerationError::QuotaExhausted { message },
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited { message },
        StatusCode::REQUEST_TIMEOUT => GenerationError::Transport { message },
        s if s.is_server_error() => GenerationError::Transport {
            message: format!("HTTP {}: {}", s.as_u16(), message),
        },
        s => GenerationError::Other {
            status: Some(s.as_u16()),
            message,
        },
    }
}
