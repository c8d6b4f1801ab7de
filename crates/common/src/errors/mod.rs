//! Error types for IdeaForge services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::llm::GenerationError;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    InvalidFormat,

    // Routing errors (4xxx)
    NotFound,
    MethodNotAllowed,

    // Rate limiting (6xxx)
    Throttled,

    // Store errors (7xxx)
    PersistenceError,
    DatabaseError,

    // Text service errors (8xxx)
    RateLimited,
    QuotaExhausted,
    UpstreamUnauthorized,
    EmptyGeneration,
    UnknownServiceError,
    PromptUpdateFailed,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::InvalidFormat => 1003,

            // Routing (4xxx)
            ErrorCode::NotFound => 4001,
            ErrorCode::MethodNotAllowed => 4002,

            // Rate limits (6xxx)
            ErrorCode::Throttled => 6001,

            // Store (7xxx)
            ErrorCode::PersistenceError => 7001,
            ErrorCode::DatabaseError => 7002,

            // Text service (8xxx)
            ErrorCode::RateLimited => 8001,
            ErrorCode::QuotaExhausted => 8002,
            ErrorCode::UpstreamUnauthorized => 8003,
            ErrorCode::EmptyGeneration => 8004,
            ErrorCode::UnknownServiceError => 8005,
            ErrorCode::PromptUpdateFailed => 8006,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Routing errors
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Method not allowed")]
    MethodNotAllowed,

    // Inbound rate limiting
    #[error("Too many requests: limit is {limit} requests per second")]
    Throttled { limit: u32 },

    // Store errors
    #[error("Failed to save submission: {message}")]
    Persistence { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    // Text service errors
    #[error("Rate limit exceeded. Please try again later. ({message})")]
    RateLimited { message: String },

    #[error("Text service quota exhausted: {message}")]
    QuotaExhausted { message: String },

    #[error("Text service rejected the credentials: {message}")]
    UpstreamUnauthorized { message: String },

    #[error("Text service returned nothing usable")]
    EmptyGeneration,

    #[error("Text service error: {message}")]
    Upstream { message: String },

    /// The submission was stored; folding it into the prompt corpus failed.
    #[error("Submission {submission_id} was saved but the system prompt update failed: {source}")]
    PromptUpdateFailed {
        submission_id: Uuid,
        #[source]
        source: Box<AppError>,
    },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::MethodNotAllowed => ErrorCode::MethodNotAllowed,
            AppError::Throttled { .. } => ErrorCode::Throttled,
            AppError::Persistence { .. } => ErrorCode::PersistenceError,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::QuotaExhausted { .. } => ErrorCode::QuotaExhausted,
            AppError::UpstreamUnauthorized { .. } => ErrorCode::UpstreamUnauthorized,
            AppError::EmptyGeneration => ErrorCode::EmptyGeneration,
            AppError::Upstream { .. } => ErrorCode::UnknownServiceError,
            AppError::PromptUpdateFailed { .. } => ErrorCode::PromptUpdateFailed,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } |
            AppError::MissingField { .. } |
            AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,

            // 405 Method Not Allowed
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,

            // 429 Too Many Requests
            AppError::Throttled { .. } |
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // Reported with the status of whatever went wrong after the save
            AppError::PromptUpdateFailed { source, .. } => source.status_code(),

            // 500 Internal Server Error
            AppError::Persistence { .. } |
            AppError::Database(_) |
            AppError::QuotaExhausted { .. } |
            AppError::UpstreamUnauthorized { .. } |
            AppError::EmptyGeneration |
            AppError::Upstream { .. } |
            AppError::Internal { .. } |
            AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Id of a submission that was durably saved before this error occurred
    pub fn saved_submission(&self) -> Option<Uuid> {
        match self {
            AppError::PromptUpdateFailed { submission_id, .. } => Some(*submission_id),
            _ => None,
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::RateLimited { message } => AppError::RateLimited { message },
            GenerationError::QuotaExhausted { message } => AppError::QuotaExhausted { message },
            GenerationError::Unauthorized { message } => AppError::UpstreamUnauthorized { message },
            GenerationError::Empty => AppError::EmptyGeneration,
            GenerationError::Transport { message } => AppError::Upstream { message },
            GenerationError::Other { status, message } => AppError::Upstream {
                message: match status {
                    Some(status) => format!("HTTP {}: {}", status, message),
                    None => message,
                },
            },
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<Uuid>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let cause = match &self {
            AppError::PromptUpdateFailed { source, .. } => Some(source.code()),
            _ => None,
        };

        let body = ErrorResponse {
            error: message,
            code,
            cause,
            submission_id: self.saved_submission(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::MissingField { field: "idea".into() };
        assert_eq!(err.code(), ErrorCode::MissingField);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Required field missing: idea");
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "idea must not be empty".into(),
            field: Some("idea".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_generation_error_conversion() {
        let err: AppError = GenerationError::QuotaExhausted { message: "billing".into() }.into();
        assert_eq!(err.code(), ErrorCode::QuotaExhausted);
        assert!(err.is_server_error());

        let err: AppError = GenerationError::RateLimited { message: "slow down".into() }.into();
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let err: AppError = GenerationError::Other { status: Some(400), message: "bad model".into() }.into();
        assert_eq!(err.code(), ErrorCode::UnknownServiceError);
        assert!(err.to_string().contains("HTTP 400: bad model"));
    }

    #[test]
    fn test_prompt_update_failed_keeps_submission() {
        let id = Uuid::new_v4();
        let err = AppError::PromptUpdateFailed {
            submission_id: id,
            source: Box::new(AppError::RateLimited { message: "429".into() }),
        };
        assert_eq!(err.saved_submission(), Some(id));
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.code(), ErrorCode::PromptUpdateFailed);
    }

    #[test]
    fn test_server_error() {
        let err = AppError::Persistence {
            message: "connection refused".into()
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_server_error());
        assert_eq!(err.saved_submission(), None);
    }
}
