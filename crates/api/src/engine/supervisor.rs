//! Job Supervisor.
//!
//! Owns the lifecycle of every job: registration, launching the engine on
//! its own execution context, cancellation, and the single terminal message
//! each job's observers receive.
//!
//! Lifecycle:
//!
//! ```text
//! Pending -> Running -> Completed
//!    |               -> Failed
//!    +-------------> Cancelling -> Cancelled
//! ```
//!
//! Cancelling is internal; snapshots report it as Running.
//!
//! A job is removed from the supervisor's table right before its terminal
//! message is queued, under the same lock observers attach with, so an
//! observer is either attached before teardown (and receives the terminal)
//! or told the job is not running.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::Message;
use crewcast_core::job_events::{DEFAULT_MAX_LINE_CHARS, DEFAULT_PAYLOAD_CHARS};
use crewcast_core::log_message::{LogFormatter, LogMessage};
use crewcast_core::outcome::TerminalOutcome;
use crewcast_core::status::JobStatus;
use crewcast_core::types::{ConnId, JobId, Timestamp};
use crewcast_events::{capture, EngineContext, EventTranslator, JobOutput, JobSpec, LogSink, WorkEngine};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::engine::dispatcher::Dispatcher;
use crate::ws::ConnectionRegistry;

/// Tunables of the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Bound for payloads embedded in structured messages.
    pub payload_chars: usize,
    /// Bound for the body of one structured message.
    pub max_line_chars: usize,
    /// How long a cancelled engine may keep running before the job is
    /// finalized without it.
    pub cancel_grace: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            payload_chars: DEFAULT_PAYLOAD_CHARS,
            max_line_chars: DEFAULT_MAX_LINE_CHARS,
            cancel_grace: Duration::from_secs(5),
        }
    }
}

/// Point-in-time view of a live job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub observers: usize,
}

/// Result of a cancel request. Never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelAck {
    CancellationRequested,
    NotRunning,
}

impl CancelAck {
    /// Human-readable acknowledgement.
    pub fn message(self, job_id: JobId) -> String {
        match self {
            CancelAck::CancellationRequested => {
                format!("Cancellation requested for job {job_id}.")
            }
            CancelAck::NotRunning => {
                format!("Job {job_id} is not running or has already finished.")
            }
        }
    }
}

struct JobEntry {
    status: JobStatus,
    cancel: CancellationToken,
    created_at: Timestamp,
    dispatcher: Dispatcher,
}

pub struct JobSupervisor {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
    registry: Arc<ConnectionRegistry>,
    engine: Arc<dyn WorkEngine>,
    settings: SupervisorSettings,
    tasks: TaskTracker,
}

impl JobSupervisor {
    pub fn new(
        engine: Arc<dyn WorkEngine>,
        registry: Arc<ConnectionRegistry>,
        settings: SupervisorSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            jobs: RwLock::new(HashMap::new()),
            registry,
            engine,
            settings,
            tasks: TaskTracker::new(),
        })
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Register a job and launch it in the background.
    ///
    /// Returns as soon as the job is registered; the engine runs on a
    /// blocking thread of its own.
    pub async fn start(self: &Arc<Self>, spec: JobSpec) -> JobId {
        let job_id = uuid::Uuid::new_v4();
        let cancel = CancellationToken::new();
        let formatter = LogFormatter::new(&job_id, self.settings.max_line_chars);
        let dispatcher = Dispatcher::new(job_id, Arc::clone(&self.registry), formatter);

        {
            let mut jobs = self.jobs.write().await;
            jobs.insert(
                job_id,
                JobEntry {
                    status: JobStatus::Pending,
                    cancel: cancel.clone(),
                    created_at: chrono::Utc::now(),
                    dispatcher: dispatcher.clone(),
                },
            );
            // Queued under the lock so it precedes any cancellation notice.
            dispatcher.dispatch(LogMessage::system(format!(
                "Pipeline starting (engine: {}, model: {})...",
                self.engine.name(),
                spec.model
            )));
        }
        tracing::info!(
            job_id = %job_id,
            engine = self.engine.name(),
            model = %spec.model,
            "Job started",
        );

        let supervisor = Arc::clone(self);
        self.tasks
            .spawn(async move { supervisor.run_job(job_id, spec, cancel, dispatcher).await });
        job_id
    }

    async fn run_job(
        self: Arc<Self>,
        job_id: JobId,
        spec: JobSpec,
        cancel: CancellationToken,
        dispatcher: Dispatcher,
    ) {
        let _guard = TerminalGuard(dispatcher.clone());
        let started = Instant::now();

        let joined = if self.mark_running(job_id).await {
            self.execute(job_id, spec, &cancel, &dispatcher).await
        } else {
            tracing::info!(job_id = %job_id, "Job cancelled before the engine started");
            None
        };

        let outcome = match joined {
            _ if cancel.is_cancelled() => {
                dispatcher.dispatch(LogMessage::system("Job cancelled by user."));
                TerminalOutcome::Cancelled
            }
            Some(Ok(Ok(output))) => TerminalOutcome::Completed(output.into_value()),
            Some(Ok(Err(err))) => {
                tracing::error!(job_id = %job_id, error = ?err, "Job failed");
                let reason = format!("{err:#}");
                dispatcher.dispatch(LogMessage::system_error(reason.clone()));
                TerminalOutcome::Failed(reason)
            }
            Some(Err(join_err)) => {
                let reason = describe_join_error(join_err);
                tracing::error!(job_id = %job_id, reason = %reason, "Job execution aborted");
                dispatcher.dispatch(LogMessage::system_error(reason.clone()));
                TerminalOutcome::Failed(reason)
            }
            None => TerminalOutcome::Cancelled,
        };

        self.finalize(job_id, outcome, &dispatcher, started).await;
    }

    /// Move a pending job to Running. Returns `false` if a cancel request
    /// got there first.
    async fn mark_running(&self, job_id: JobId) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job_id) {
            Some(entry) if entry.status == JobStatus::Pending => {
                entry.status = JobStatus::Running;
                true
            }
            _ => false,
        }
    }

    /// Run the engine on a blocking thread and wait for it, giving up
    /// `cancel_grace` after a cancel request. `None` means the engine was
    /// abandoned.
    async fn execute(
        &self,
        job_id: JobId,
        spec: JobSpec,
        cancel: &CancellationToken,
        dispatcher: &Dispatcher,
    ) -> Option<Result<anyhow::Result<JobOutput>, JoinError>> {
        let engine = Arc::clone(&self.engine);
        let sink: Arc<dyn LogSink> = Arc::new(dispatcher.clone());
        let translator = EventTranslator::new(job_id, Arc::clone(&sink), self.settings.payload_chars);
        let token = cancel.clone();

        let mut execution = tokio::task::spawn_blocking(move || -> anyhow::Result<JobOutput> {
            let _capture = capture::install(job_id, sink)?;
            let ctx = EngineContext::new(&translator, token);
            engine.run(&spec, &ctx)
        });

        tokio::select! {
            joined = &mut execution => Some(joined),
            () = cancel.cancelled() => {
                match tokio::time::timeout(self.settings.cancel_grace, &mut execution).await {
                    Ok(joined) => Some(joined),
                    Err(_) => {
                        tracing::warn!(
                            job_id = %job_id,
                            grace_secs = self.settings.cancel_grace.as_secs(),
                            "Engine ignored cancellation, finalizing without it",
                        );
                        None
                    }
                }
            }
        }
    }

    async fn finalize(
        &self,
        job_id: JobId,
        outcome: TerminalOutcome,
        dispatcher: &Dispatcher,
        started: Instant,
    ) {
        self.jobs.write().await.remove(&job_id);
        tracing::info!(
            job_id = %job_id,
            status = %outcome.status(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Job finished",
        );
        dispatcher.finish(outcome);
    }

    /// Request cancellation of a running job.
    ///
    /// Unknown and already-finished jobs are a no-op reported as
    /// [`CancelAck::NotRunning`]. Repeated requests for a job that is
    /// already cancelling are acknowledged again without side effects.
    pub async fn cancel(&self, job_id: JobId) -> CancelAck {
        let mut jobs = self.jobs.write().await;
        let Some(entry) = jobs.get_mut(&job_id) else {
            tracing::info!(job_id = %job_id, "Cancel requested for job that is not running");
            return CancelAck::NotRunning;
        };

        match entry.status {
            JobStatus::Cancelling => CancelAck::CancellationRequested,
            status if status.is_cancellable() => {
                entry.status = JobStatus::Cancelling;
                entry
                    .dispatcher
                    .dispatch(LogMessage::system("Cancellation requested."));
                entry.cancel.cancel();
                tracing::info!(job_id = %job_id, "Cancellation requested");
                CancelAck::CancellationRequested
            }
            _ => CancelAck::NotRunning,
        }
    }

    /// Attach an observer to a live job.
    ///
    /// Returns `None` when the job is unknown or already finalizing.
    pub async fn attach_observer(
        &self,
        job_id: JobId,
        conn_id: ConnId,
    ) -> Option<mpsc::UnboundedReceiver<Message>> {
        let jobs = self.jobs.read().await;
        if !jobs.contains_key(&job_id) {
            return None;
        }
        Some(self.registry.attach(job_id, conn_id).await)
    }

    pub async fn snapshot(&self, job_id: JobId) -> Option<JobSnapshot> {
        let (status, created_at) = {
            let jobs = self.jobs.read().await;
            let entry = jobs.get(&job_id)?;
            (entry.status.client_view(), entry.created_at)
        };
        Some(JobSnapshot {
            job_id,
            status,
            created_at,
            observers: self.registry.observer_count(job_id).await,
        })
    }

    /// Snapshots of every live job, oldest first.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        let entries: Vec<(JobId, JobStatus, Timestamp)> = self
            .jobs
            .read()
            .await
            .iter()
            .map(|(id, entry)| (*id, entry.status.client_view(), entry.created_at))
            .collect();

        let mut snapshots = Vec::with_capacity(entries.len());
        for (job_id, status, created_at) in entries {
            snapshots.push(JobSnapshot {
                job_id,
                status,
                created_at,
                observers: self.registry.observer_count(job_id).await,
            });
        }
        snapshots.sort_by_key(|s| s.created_at);
        snapshots
    }

    /// Number of jobs that have not reached a terminal state.
    pub async fn running_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Cancel every live job and wait up to `timeout` for all of them to
    /// finalize.
    pub async fn shutdown(&self, timeout: Duration) {
        let ids: Vec<JobId> = self.jobs.read().await.keys().copied().collect();
        tracing::info!(count = ids.len(), "Cancelling running jobs");
        for job_id in ids {
            self.cancel(job_id).await;
        }

        self.tasks.close();
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.running_count().await,
                "Jobs did not finish within the shutdown timeout",
            );
        }
    }
}

/// Ensures observers get a terminal message even if the supervising task
/// is dropped before it finalizes the job.
struct TerminalGuard(Dispatcher);

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let outcome = TerminalOutcome::Failed("job supervision ended unexpectedly".into());
        if self.0.finish(outcome) {
            tracing::error!(job_id = %self.0.job_id(), "Job dropped before finalizing");
        }
    }
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_panic() {
        format!("engine panicked: {}", panic_message(err.into_panic()))
    } else {
        "engine execution was aborted".to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
