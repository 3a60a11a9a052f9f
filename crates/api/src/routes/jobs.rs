use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Job routes, mounted at `/jobs`.
///
/// ```text
/// POST   /                      start a job
/// GET    /                      list live jobs
/// GET    /{job_id}              job snapshot
/// POST   /{job_id}/cancel       request cancellation
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(jobs::start_job).get(jobs::list_jobs))
        .route("/{job_id}", get(jobs::get_job))
        .route("/{job_id}/cancel", post(jobs::cancel_job))
}
