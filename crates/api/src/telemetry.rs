//! Tracing bootstrap.
//!
//! Console output goes through an `EnvFilter`-controlled fmt layer. When a
//! diagnostic directory is configured, the full engine callback records
//! (target [`DIAGNOSTIC_TARGET`]) are additionally written to a daily
//! rolling file.

use crewcast_events::DIAGNOSTIC_TARGET;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::filter::{EnvFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::config::ServerConfig;

const DEFAULT_FILTER: &str =
    "crewcast_api=debug,crewcast_events=info,crewcast_pipeline=info,crewcast::diagnostic=info,tower_http=debug";

/// Install the global subscriber.
///
/// The returned guard flushes the diagnostic file on drop and must be held
/// for the life of the process.
pub fn init_tracing(config: &ServerConfig) -> Option<WorkerGuard> {
    let console = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
    );

    let (diagnostic, guard) = match &config.diagnostic_log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "diagnostic.log");
            // Blocks the emitter when the buffer is full instead of dropping
            // records.
            let (writer, guard) = NonBlockingBuilder::default().lossy(false).finish(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(Targets::new().with_target(DIAGNOSTIC_TARGET, Level::TRACE));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(diagnostic)
        .init();

    if let Some(dir) = &config.diagnostic_log_dir {
        tracing::info!(dir = %dir.display(), "Diagnostic log enabled");
    }
    guard
}
