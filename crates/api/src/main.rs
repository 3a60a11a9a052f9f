use std::net::SocketAddr;
use std::sync::Arc;

use crewcast_api::config::ServerConfig;
use crewcast_api::engine::JobSupervisor;
use crewcast_api::router::build_app_router;
use crewcast_api::state::AppState;
use crewcast_api::{telemetry, ws};
use crewcast_pipeline::ScriptedCrew;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration + tracing ---
    let config = ServerConfig::from_env();
    let _diagnostic_guard = telemetry::init_tracing(&config);
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Observer registry + heartbeat ---
    let registry = Arc::new(ws::ConnectionRegistry::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&registry), config.heartbeat_interval());

    // --- Job supervisor ---
    let engine = Arc::new(ScriptedCrew::with_step_delay(config.pipeline_step_delay()));
    let supervisor = JobSupervisor::new(engine, Arc::clone(&registry), config.supervisor_settings());
    tracing::info!("Job supervisor ready");

    // --- App state + router ---
    let state = AppState {
        config: Arc::new(config.clone()),
        registry: Arc::clone(&registry),
        supervisor: Arc::clone(&supervisor),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    supervisor.shutdown(config.shutdown_timeout()).await;
    tracing::info!("Running jobs wound down");

    let ws_count = registry.connection_count().await;
    tracing::info!(ws_count, "Closing remaining observer connections");
    registry.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
