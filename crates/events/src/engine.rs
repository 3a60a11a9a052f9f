//! Contract between the job supervisor and a work engine.
//!
//! A [`WorkEngine`] runs synchronously on a dedicated execution context.
//! It reports progress through the [`EngineContext`] it is handed: typed
//! lifecycle callbacks via [`EngineContext::emit`], free narration via
//! [`EngineContext::console`], and it polls for cooperative cancellation.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::capture::Console;
use crate::event::EngineEvent;

/// Longest single sleep slice of [`EngineContext::sleep`].
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Everything an engine needs to run one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// The user's request in free text.
    pub task: String,
    /// Model the engine should use for its workers.
    pub model: String,
    /// Named placeholders the engine interpolates into its prompts.
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

impl JobSpec {
    pub fn new(task: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            model: model.into(),
            inputs: Map::new(),
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    /// String value of a named input, if present.
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).and_then(Value::as_str)
    }
}

/// The value an engine hands back on success.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutput {
    /// A portable structured value.
    Structured(Value),
    /// Textual fallback for results that have no structured form.
    Text(String),
}

impl JobOutput {
    /// Convert any result into an output, falling back to its debug
    /// representation when it cannot be expressed as JSON.
    pub fn from_serialize<T>(value: &T) -> Self
    where
        T: Serialize + fmt::Debug,
    {
        match serde_json::to_value(value) {
            Ok(json) => JobOutput::Structured(json),
            Err(err) => {
                tracing::debug!(error = %err, "Result is not JSON-representable, using text form");
                JobOutput::Text(format!("{value:?}"))
            }
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            JobOutput::Structured(value) => value,
            JobOutput::Text(text) => Value::String(text),
        }
    }
}

impl From<Value> for JobOutput {
    fn from(value: Value) -> Self {
        JobOutput::Structured(value)
    }
}

/// Returned by engine checkpoints once cancellation has been requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("job was cancelled")]
pub struct Cancelled;

/// Receiver of an engine's lifecycle callbacks.
pub trait EngineCallbacks: Send + Sync {
    fn on_event(&self, event: EngineEvent);
}

/// Handle given to a running engine.
pub struct EngineContext<'a> {
    callbacks: &'a dyn EngineCallbacks,
    cancel: CancellationToken,
}

impl<'a> EngineContext<'a> {
    pub fn new(callbacks: &'a dyn EngineCallbacks, cancel: CancellationToken) -> Self {
        Self { callbacks, cancel }
    }

    /// Report a lifecycle event.
    pub fn emit(&self, event: EngineEvent) {
        self.callbacks.on_event(event);
    }

    /// Writer for free-form narration.
    pub fn console(&self) -> Console {
        Console
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancellation point: `Err(Cancelled)` once a cancel was requested.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.cancel.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Block for `duration`, returning early with `Err(Cancelled)` if the
    /// job is cancelled meanwhile.
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        let deadline = Instant::now() + duration;
        loop {
            self.checkpoint()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL_INTERVAL));
        }
    }
}

/// A job runner. Runs to completion or failure on the calling thread.
pub trait WorkEngine: Send + Sync + 'static {
    /// Human-readable engine name, shown in the job's first log line.
    fn name(&self) -> &str;

    fn run(&self, spec: &JobSpec, ctx: &EngineContext<'_>) -> anyhow::Result<JobOutput>;
}
