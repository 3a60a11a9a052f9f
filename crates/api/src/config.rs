use std::path::PathBuf;
use std::time::Duration;

use crewcast_core::job_events::{DEFAULT_MAX_LINE_CHARS, DEFAULT_PAYLOAD_CHARS};

use crate::engine::SupervisorSettings;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Time running jobs get to wind down on shutdown (default: `10`).
    pub shutdown_timeout_secs: u64,
    /// WebSocket ping interval in seconds (default: `30`).
    pub heartbeat_interval_secs: u64,
    /// Bound for payloads embedded in structured log messages.
    pub log_payload_chars: usize,
    /// Bound for the body of one structured log message.
    pub log_line_max_chars: usize,
    /// How long a cancelled engine may keep running (default: `5`).
    pub cancel_grace_secs: u64,
    /// Directory for the durable diagnostic log. Disabled when unset.
    pub diagnostic_log_dir: Option<PathBuf>,
    /// Pacing of the scripted crew in milliseconds (default: `400`).
    pub pipeline_step_delay_ms: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                    |
    /// |---------------------------|----------------------------|
    /// | `HOST`                    | `0.0.0.0`                  |
    /// | `PORT`                    | `8000`                     |
    /// | `CORS_ORIGINS`            | `http://localhost:5173,http://localhost:4173,http://localhost:3000` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `10`                       |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`                       |
    /// | `LOG_PAYLOAD_CHARS`       | `200`                      |
    /// | `LOG_LINE_MAX_CHARS`      | `2000`                     |
    /// | `CANCEL_GRACE_SECS`       | `5`                        |
    /// | `DIAGNOSTIC_LOG_DIR`      | unset                      |
    /// | `PIPELINE_STEP_DELAY_MS`  | `400`                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| {
                "http://localhost:5173,http://localhost:4173,http://localhost:3000".into()
            })
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let diagnostic_log_dir = std::env::var("DIAGNOSTIC_LOG_DIR")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: env_number("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_number("SHUTDOWN_TIMEOUT_SECS", 10),
            heartbeat_interval_secs: env_number("HEARTBEAT_INTERVAL_SECS", 30),
            log_payload_chars: env_number("LOG_PAYLOAD_CHARS", DEFAULT_PAYLOAD_CHARS),
            log_line_max_chars: env_number("LOG_LINE_MAX_CHARS", DEFAULT_MAX_LINE_CHARS),
            cancel_grace_secs: env_number("CANCEL_GRACE_SECS", 5),
            diagnostic_log_dir,
            pipeline_step_delay_ms: env_number("PIPELINE_STEP_DELAY_MS", 400),
        }
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            payload_chars: self.log_payload_chars,
            max_line_chars: self.log_line_max_chars,
            cancel_grace: Duration::from_secs(self.cancel_grace_secs),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn pipeline_step_delay(&self) -> Duration {
        Duration::from_millis(self.pipeline_step_delay_ms)
    }
}

/// Read a numeric env var, falling back to `default` when unset.
///
/// Panics on an unparseable value; misconfiguration fails fast at startup.
fn env_number<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid number: {e}")),
        Err(_) => default,
    }
}
