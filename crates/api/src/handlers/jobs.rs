//! Handlers for job submission and retrieval.
//!
//! Submission validates before anything is persisted: a rejected job
//! leaves no row behind. Accepted jobs are enqueued and picked up by the
//! dispatch loop; nothing here ever touches the engine.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use airlock_core::error::CoreError;
use airlock_db::models::{CallbackMode, JobStatus, NewJob};
use airlock_db::repositories::JobRepo;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// How often a synchronous `/generate` call re-checks the job row.
const SYNC_POLL_INTERVAL: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Body returned by `POST /execute`.
#[derive(Serialize)]
pub struct EnqueueResponse {
    pub status: &'static str,
    pub job_id: String,
}

/// Body returned by `POST /generate` once the job completes.
#[derive(Serialize)]
pub struct GenerateResponse {
    pub status: &'static str,
    pub job_id: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a submission before any row is written.
///
/// Checks the payload against the deployment's required-field schema and,
/// for callback mode, that the callback URL is a syntactically valid
/// http(s) URL. The URL is not probed; an unreachable consumer surfaces
/// at delivery time, not here.
fn validate_submission(state: &AppState, input: &NewJob) -> AppResult<()> {
    state.schema.validate(&input.payload)?;

    if input.callback_mode == CallbackMode::Callback {
        let url = input
            .callback_target
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("callback mode requires a callback_url".into()))?;
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| AppError::BadRequest(format!("Invalid callback_url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::BadRequest(format!(
                "Invalid callback_url scheme '{}', expected http or https",
                parsed.scheme(),
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /execute
///
/// Validate and enqueue a job, returning immediately regardless of queue
/// depth. The result arrives later over the channel chosen in the
/// submission (WebSocket push or HTTP callback).
pub async fn execute(
    State(state): State<AppState>,
    Json(input): Json<NewJob>,
) -> AppResult<impl IntoResponse> {
    validate_submission(&state, &input)?;

    let job = JobRepo::enqueue(&state.pool, &input).await?;

    tracing::info!(
        job_id = %job.id,
        callback_mode = ?job.callback_mode,
        result_format = ?job.result_format,
        "Job enqueued",
    );

    Ok(Json(EnqueueResponse {
        status: "enqueued",
        job_id: job.id,
    }))
}

// ---------------------------------------------------------------------------
// Submit and wait
// ---------------------------------------------------------------------------

/// POST /generate
///
/// Synchronous variant: enqueue, then poll the store until the dispatch
/// loop finishes the job. Completed jobs return the artifact path;
/// failed jobs surface the engine diagnostic as a 500.
///
/// There is no server-side deadline. The route is mounted outside the
/// request-timeout layer and the caller controls how long it is willing
/// to wait by hanging up; the job itself finishes either way.
pub async fn generate(
    State(state): State<AppState>,
    Json(input): Json<NewJob>,
) -> AppResult<impl IntoResponse> {
    validate_submission(&state, &input)?;

    let job = JobRepo::enqueue(&state.pool, &input).await?;
    tracing::info!(job_id = %job.id, "Job enqueued, caller waiting synchronously");

    loop {
        tokio::time::sleep(SYNC_POLL_INTERVAL).await;

        let current = JobRepo::find_by_id(&state.pool, &job.id)
            .await?
            .ok_or_else(|| {
                AppError::InternalError(format!("Job {} vanished while a caller was waiting", job.id))
            })?;

        match current.status {
            JobStatus::Completed => {
                let file_path = current.result_file_path().ok_or_else(|| {
                    AppError::InternalError(format!(
                        "Completed job {} has no artifact reference",
                        job.id,
                    ))
                })?;
                return Ok(Json(GenerateResponse {
                    status: "completed",
                    job_id: current.id,
                    file_path,
                }));
            }
            JobStatus::Failed => {
                let detail = current
                    .result
                    .unwrap_or_else(|| "Job failed without diagnostic".to_string());
                return Err(AppError::JobFailed(detail));
            }
            JobStatus::Pending | JobStatus::Processing => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /jobs/{id}
///
/// Full job row as JSON: the poll path, and the recovery path for
/// missed pushes and failed callbacks.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job = JobRepo::find_by_id(&state.pool, &job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))?;

    Ok(Json(job))
}
