//! Prompt handlers: single-idea transform, multi-idea combine, and the
//! derived system prompt

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
pub struct TransformRequest {
    pub idea: Option<String>,
}

#[derive(Serialize)]
pub struct TransformResponse {
    pub prompt: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CombineRequest {
    #[validate(length(max = 500))]
    pub ideas: Option<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombineResponse {
    pub combined_prompt: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemPromptResponse {
    pub system_prompt: String,
    pub fragment_count: usize,
}

/// Turn one idea into a prompt fragment without storing anything
pub async fn transform(
    State(state): State<AppState>,
    payload: std::result::Result<Json<TransformRequest>, JsonRejection>,
) -> Result<Json<TransformResponse>> {
    let request = parse_body(payload)?;
    let idea = required("idea", request.idea)?;

    let prompt = state.pipeline.transform(&idea).await?;
    Ok(Json(TransformResponse { prompt }))
}

/// Merge a list of ideas into one prompt
pub async fn combine(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CombineRequest>, JsonRejection>,
) -> Result<Json<CombineResponse>> {
    let request = parse_body(payload)?;
    let ideas = required("ideas", request.ideas)?;

    let combined_prompt = state.pipeline.combine(&ideas).await?;
    Ok(Json(CombineResponse { combined_prompt }))
}

/// Current concatenated system prompt
pub async fn system_prompt(State(state): State<AppState>) -> Result<Json<SystemPromptResponse>> {
    let system_prompt = state.pipeline.concatenated_system_prompt().await?;
    let fragment_count = state.pipeline.fragment_count().await?;
    Ok(Json(SystemPromptResponse { system_prompt, fragment_count }))
}
