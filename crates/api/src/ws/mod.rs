//! WebSocket infrastructure for streaming job logs.
//!
//! Provides the per-job connection registry, heartbeat pings, and the
//! HTTP upgrade handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod registry;

pub use handler::ws_logs_handler;
pub use heartbeat::start_heartbeat;
pub use registry::ConnectionRegistry;
