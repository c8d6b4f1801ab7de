//! Chat handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{parse_body, required};
use crate::AppState;
use ideaforge_common::errors::Result;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[validate(length(max = 8000))]
    pub message: Option<String>,

    /// Falls back to the derived system prompt when absent
    #[validate(length(max = 50000))]
    pub system_prompt: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub response: String,
}

pub async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>> {
    let request = parse_body(payload)?;
    let message = required("message", request.message)?;

    let response = state
        .pipeline
        .chat(&message, request.system_prompt.as_deref())
        .await?;
    Ok(Json(ChatResponse { response }))
}
