//! Request handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use mstudio_models::{CaptionRequest, GenerateRequest, JobId, RenderJob, SubmitResponse};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub job_store: CheckStatus,
    pub queue_headroom: usize,
    pub queue_capacity: usize,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
}

/// Readiness probe: the job store answers.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let orchestrator = &state.orchestrator;
    let (status, job_store) = match orchestrator.store().len().await {
        Ok(jobs) => (
            StatusCode::OK,
            CheckStatus {
                status: "ok".to_string(),
                error: None,
                jobs: Some(jobs),
            },
        ),
        Err(e) => {
            warn!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                CheckStatus {
                    status: "error".to_string(),
                    error: Some(e.to_string()),
                    jobs: None,
                },
            )
        }
    };

    let body = ReadinessResponse {
        status: if status == StatusCode::OK { "ready" } else { "not_ready" }.to_string(),
        job_store,
        queue_headroom: orchestrator.queue_headroom(),
        queue_capacity: orchestrator.queue_capacity(),
    };
    (status, Json(body))
}

/// Submit a prompt render.
pub async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let job_id = state.orchestrator.submit_prompt(&request).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse::processing(job_id))))
}

/// Submit a caption job.
pub async fn captions(
    State(state): State<AppState>,
    body: Result<Json<CaptionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let job_id = state.orchestrator.submit_captions(request).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse::processing(job_id))))
}

/// Current record of a job.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<RenderJob>> {
    let job = state.orchestrator.status(&JobId::from_string(job_id)).await?;
    Ok(Json(job))
}

#[derive(Serialize)]
pub struct StylesResponse {
    pub styles: Vec<String>,
}

/// Addressable caption style ids.
pub async fn list_styles(State(state): State<AppState>) -> Json<StylesResponse> {
    Json(StylesResponse {
        styles: state.styles.ids(),
    })
}
