//! Submission handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{parse_body, required};
use crate::AppState;
use ideaforge_common::{
    config::SubmissionStrategy,
    db::models::Submission,
    errors::Result,
    pipeline::FragmentOutcome,
};

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    pub idea: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    pub id: Uuid,
    pub idea: String,
    pub created_at: DateTime<FixedOffset>,
}

impl From<Submission> for SubmissionView {
    fn from(submission: Submission) -> Self {
        Self {
            id: submission.id,
            idea: submission.idea,
            created_at: submission.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentView {
    pub prompt_text: String,
    /// False when an identical fragment already existed
    pub appended: bool,
}

impl From<FragmentOutcome> for FragmentView {
    fn from(outcome: FragmentOutcome) -> Self {
        match outcome {
            FragmentOutcome::Appended(fragment) => Self {
                prompt_text: fragment.prompt_text,
                appended: true,
            },
            FragmentOutcome::AlreadyPresent(prompt_text) => Self {
                prompt_text,
                appended: false,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub submission: SubmissionView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_fragment: Option<FragmentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    pub submissions: Vec<SubmissionView>,
}

/// Record an idea and update the prompt using the configured strategy
pub async fn create_submission(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let request = parse_body(payload)?;
    let idea = required("idea", request.idea)?;

    let response = match state.strategy {
        SubmissionStrategy::Fragments => {
            let outcome = state.pipeline.submit(&idea).await?;
            SubmitResponse {
                submission: outcome.submission.into(),
                prompt_fragment: Some(outcome.fragment.into()),
                combined_prompt: None,
            }
        }
        SubmissionStrategy::Combine => {
            let outcome = state.pipeline.submit_and_combine(&idea).await?;
            SubmitResponse {
                submission: outcome.submission.into(),
                prompt_fragment: None,
                combined_prompt: Some(outcome.combined_prompt),
            }
        }
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// Every submission, oldest first
pub async fn list_submissions(State(state): State<AppState>) -> Result<Json<TimelineResponse>> {
    let submissions = state
        .pipeline
        .timeline()
        .await?
        .into_iter()
        .map(SubmissionView::from)
        .collect();
    Ok(Json(TimelineResponse { submissions }))
}
