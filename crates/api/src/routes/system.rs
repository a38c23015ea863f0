use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use airlock_db::repositories::JobRepo;

use crate::error::AppResult;
use crate::state::AppState;

/// Broker status payload: engine residency plus queue depth.
#[derive(Serialize)]
pub struct StatusResponse {
    pub engine_loaded: bool,
    pub jobs_pending: i64,
    pub jobs_processing: i64,
}

/// GET /status -- engine residency and queue counters, for capacity
/// checks and dashboards.
async fn broker_status(State(state): State<AppState>) -> AppResult<Json<StatusResponse>> {
    let counts = JobRepo::counts(&state.pool).await?;

    Ok(Json(StatusResponse {
        engine_loaded: state.lifecycle.is_loaded(),
        jobs_pending: counts.pending,
        jobs_processing: counts.processing,
    }))
}

/// Mount the status route.
pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(broker_status))
}
