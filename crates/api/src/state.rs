use std::sync::Arc;

use crate::config::ServerConfig;
use crate::engine::JobSupervisor;
use crate::ws::ConnectionRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Observer connections per job.
    pub registry: Arc<ConnectionRegistry>,
    /// Owner of every running job.
    pub supervisor: Arc<JobSupervisor>,
}
