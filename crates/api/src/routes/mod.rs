pub mod health;
pub mod jobs;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                          job control (see routes::jobs)
/// /ws/logs/{job_id}              observer WebSocket for one job
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .route("/ws/logs/{job_id}", get(ws::ws_logs_handler))
}
