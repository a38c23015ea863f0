//! Route definitions for job submission and retrieval.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Fast job routes, wrapped by the request timeout.
///
/// ```text
/// POST   /execute        -> execute
/// GET    /jobs/{id}      -> get_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/execute", post(jobs::execute))
        .route("/jobs/{id}", get(jobs::get_job))
}

/// Synchronous generation route, mounted outside the request timeout:
/// the handler holds the request open until the job is terminal.
///
/// ```text
/// POST   /generate       -> generate
/// ```
pub fn sync_router() -> Router<AppState> {
    Router::new().route("/generate", post(jobs::generate))
}
