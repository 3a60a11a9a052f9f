//! Handlers for starting, inspecting and cancelling jobs.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use crewcast_core::error::CoreError;
use crewcast_core::types::JobId;
use crewcast_events::JobSpec;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::engine::CancelAck;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Model used when the request does not name one.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

const DEFAULT_DATASET_DESCRIPTION: &str = "No specific dataset description provided.";
const DEFAULT_PROJECT_GOAL: &str = "Perform a general analysis.";

/// Request body for `POST /jobs`.
#[derive(Debug, Deserialize, Validate)]
pub struct StartJobRequest {
    #[validate(length(min = 1, max = 10000, message = "task must not be empty"))]
    pub task: String,
    #[validate(length(min = 1, max = 200))]
    pub model_name: Option<String>,
    pub dataset_description: Option<String>,
    pub project_goal: Option<String>,
    pub dataset_path: Option<String>,
}

impl StartJobRequest {
    /// Build the engine input, filling in defaults for omitted fields.
    pub fn into_spec(self) -> JobSpec {
        let model = self.model_name.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let description = self
            .dataset_description
            .unwrap_or_else(|| DEFAULT_DATASET_DESCRIPTION.to_string());
        let goal = self
            .project_goal
            .unwrap_or_else(|| DEFAULT_PROJECT_GOAL.to_string());
        let dataset_path = self.dataset_path.unwrap_or_default();

        JobSpec::new(self.task.clone(), model)
            .with_input("user_raw_query", self.task)
            .with_input("user_dataset_description", description.clone())
            .with_input("dataset_description", description)
            .with_input("user_project_goal", goal.clone())
            .with_input("project_goal", goal)
            .with_input("dataset_path", dataset_path)
    }
}

#[derive(Debug, Serialize)]
pub struct JobStarted {
    pub job_id: JobId,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub status: CancelAck,
    pub message: String,
}

// ---------------------------------------------------------------------------
// POST /jobs
// ---------------------------------------------------------------------------

pub async fn start_job(
    State(state): State<AppState>,
    payload: Result<Json<StartJobRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    input.validate()?;
    if input.task.trim().is_empty() {
        return Err(CoreError::Validation("task must not be empty".into()).into());
    }

    let spec = input.into_spec();
    tracing::info!(task = %spec.task, model = %spec.model, "Job requested");
    let job_id = state.supervisor.start(spec).await;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: JobStarted {
                job_id,
                message: "Job started".to_string(),
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// GET /jobs
// ---------------------------------------------------------------------------

pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(DataResponse {
        data: state.supervisor.list().await,
    })
}

// ---------------------------------------------------------------------------
// GET /jobs/{job_id}
// ---------------------------------------------------------------------------

pub async fn get_job(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let not_found = || CoreError::NotFound {
        entity: "Job",
        id: raw_id.clone(),
    };
    let job_id = parse_job_id(&raw_id).ok_or_else(not_found)?;
    let snapshot = state.supervisor.snapshot(job_id).await.ok_or_else(not_found)?;
    Ok(Json(DataResponse { data: snapshot }))
}

// ---------------------------------------------------------------------------
// POST /jobs/{job_id}/cancel
// ---------------------------------------------------------------------------

/// Cancel a job. Unknown or finished jobs are reported, not rejected.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> impl IntoResponse {
    let (status, message) = match parse_job_id(&raw_id) {
        Some(job_id) => {
            let ack = state.supervisor.cancel(job_id).await;
            (ack, ack.message(job_id))
        }
        None => (
            CancelAck::NotRunning,
            format!("Job {raw_id} is not running or has already finished."),
        ),
    };

    Json(DataResponse {
        data: CancelResponse {
            job_id: raw_id,
            status,
            message,
        },
    })
}

/// Parse a job id from a path segment.
pub fn parse_job_id(raw: &str) -> Option<JobId> {
    raw.trim().parse().ok()
}
