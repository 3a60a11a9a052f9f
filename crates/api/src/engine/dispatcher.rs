//! Hands log messages from a job's execution context to the observer side.
//!
//! Engines run on blocking threads; observer connections are served by the
//! async runtime. Each job gets one [`Dispatcher`] whose pump task delivers
//! messages to the [`ConnectionRegistry`] strictly in submission order.
//! When no pump is available (no runtime at creation, or the runtime is
//! gone) delivery happens inline on the calling thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::close_code;
use crewcast_core::log_message::{LogFormatter, LogMessage};
use crewcast_core::outcome::TerminalOutcome;
use crewcast_core::types::JobId;
use crewcast_events::LogSink;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::ws::ConnectionRegistry;

enum Delivery {
    Log(LogMessage),
    /// Terminal line followed by a normal close; ends the stream.
    Terminal(TerminalOutcome),
}

/// Per-job, cloneable sender of observer-bound messages.
///
/// After [`Dispatcher::finish`] every further message is dropped, so the
/// terminal line is always the last thing an observer receives.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    job_id: JobId,
    tx: mpsc::UnboundedSender<Delivery>,
    registry: Arc<ConnectionRegistry>,
    formatter: LogFormatter,
    finished: AtomicBool,
}

impl Dispatcher {
    /// Create the dispatcher for `job_id`, spawning its pump on the current
    /// runtime if there is one.
    pub fn new(job_id: JobId, registry: Arc<ConnectionRegistry>, formatter: LogFormatter) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(pump(job_id, rx, Arc::clone(&registry), formatter.clone()));
            }
            Err(_) => {
                tracing::debug!(job_id = %job_id, "No async runtime; dispatching inline");
                drop(rx);
            }
        }

        Self {
            inner: Arc::new(Inner {
                job_id,
                tx,
                registry,
                formatter,
                finished: AtomicBool::new(false),
            }),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.inner.job_id
    }

    /// Queue one message for the job's observers.
    pub fn dispatch(&self, message: LogMessage) {
        if self.is_finished() {
            tracing::trace!(job_id = %self.inner.job_id, "Dropping message after terminal");
            return;
        }
        self.deliver(Delivery::Log(message));
    }

    /// Queue the terminal message and the close that follows it.
    ///
    /// Only the first call has an effect; returns whether this call was it.
    pub fn finish(&self, outcome: TerminalOutcome) -> bool {
        if self.inner.finished.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.deliver(Delivery::Terminal(outcome));
        true
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::SeqCst)
    }

    fn deliver(&self, delivery: Delivery) {
        let Err(mpsc::error::SendError(delivery)) = self.inner.tx.send(delivery) else {
            return;
        };
        // The pump only exits after the terminal, or with its runtime.
        if matches!(delivery, Delivery::Log(_)) && self.is_finished() {
            return;
        }
        let inner = &self.inner;
        futures::executor::block_on(deliver_one(
            inner.job_id,
            &inner.registry,
            &inner.formatter,
            delivery,
        ));
    }
}

impl LogSink for Dispatcher {
    fn emit(&self, message: LogMessage) {
        self.dispatch(message);
    }
}

async fn pump(
    job_id: JobId,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
    registry: Arc<ConnectionRegistry>,
    formatter: LogFormatter,
) {
    while let Some(delivery) = rx.recv().await {
        if !deliver_one(job_id, &registry, &formatter, delivery).await {
            break;
        }
    }
    tracing::trace!(job_id = %job_id, "Dispatcher pump stopped");
}

/// Deliver one item. Returns `false` once the stream is over.
async fn deliver_one(
    job_id: JobId,
    registry: &ConnectionRegistry,
    formatter: &LogFormatter,
    delivery: Delivery,
) -> bool {
    match delivery {
        Delivery::Log(message) => {
            registry.broadcast_text(job_id, formatter.format(&message)).await;
            true
        }
        Delivery::Terminal(outcome) => {
            let delivered = registry.broadcast_text(job_id, outcome.render()).await;
            registry
                .close_all(job_id, close_code::NORMAL, outcome.close_reason())
                .await;
            tracing::debug!(
                job_id = %job_id,
                status = %outcome.status(),
                observers = delivered,
                "Terminal message delivered",
            );
            false
        }
    }
}
