//! API handlers module

pub mod chat;
pub mod health;
pub mod prompts;
pub mod submissions;

use axum::{extract::rejection::JsonRejection, http::Uri, Json};
use validator::{Validate, ValidationErrors};

use ideaforge_common::errors::{AppError, Result};

/// Unwrap a JSON body, turning extractor rejections into 400s and
/// running the request's `validator` rules
pub fn parse_body<T: Validate>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    let Json(body) = payload.map_err(|rejection| AppError::InvalidFormat {
        message: rejection.body_text(),
    })?;
    body.validate().map_err(validation_error)?;
    Ok(body)
}

/// Presence check for fields that are optional in the wire type
pub fn required<T>(field: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| AppError::MissingField {
        field: field.to_string(),
    })
}

fn validation_error(errors: ValidationErrors) -> AppError {
    let field = errors.field_errors().keys().next().map(|f| f.to_string());
    AppError::Validation {
        message: errors.to_string(),
        field,
    }
}

/// Unknown path
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound {
        resource: uri.path().to_string(),
    }
}

/// Known path, wrong method
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
