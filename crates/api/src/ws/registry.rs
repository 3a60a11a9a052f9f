use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message};
use crewcast_core::types::{ConnId, JobId, Timestamp};
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// One observer attached to a job's stream.
pub struct ObserverConnection {
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// When this observer attached.
    pub connected_at: Timestamp,
}

/// Tracks which observer connections are attached to which job.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared between the HTTP handlers and the per-job dispatchers. A job
/// entry exists only while it has at least one attached observer.
pub struct ConnectionRegistry {
    jobs: RwLock<HashMap<JobId, HashMap<ConnId, ObserverConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Attach an observer to a job.
    ///
    /// Returns the receiver half of the observer's outbound channel; the
    /// caller forwards it to the WebSocket sink. Attaching the same
    /// connection twice replaces the earlier channel.
    pub async fn attach(&self, job_id: JobId, conn_id: ConnId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = ObserverConnection {
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        let mut jobs = self.jobs.write().await;
        let observers = jobs.entry(job_id).or_default();
        observers.insert(conn_id, conn);
        tracing::debug!(
            job_id = %job_id,
            conn_id = %conn_id,
            observers = observers.len(),
            "Observer attached",
        );
        rx
    }

    /// Detach an observer. Unknown jobs or connections are a no-op.
    ///
    /// Returns whether the connection was attached.
    pub async fn detach(&self, job_id: JobId, conn_id: ConnId) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(observers) = jobs.get_mut(&job_id) else {
            return false;
        };
        let removed = observers.remove(&conn_id).is_some();
        if observers.is_empty() {
            jobs.remove(&job_id);
        }
        if removed {
            tracing::debug!(job_id = %job_id, conn_id = %conn_id, "Observer detached");
        }
        removed
    }

    /// Send a message to every observer of `job_id`.
    ///
    /// Observers whose channel is closed are removed on the spot; the
    /// remaining observers still receive the message. Returns the number of
    /// observers the message was delivered to.
    pub async fn broadcast(&self, job_id: JobId, message: Message) -> usize {
        let mut jobs = self.jobs.write().await;
        let Some(observers) = jobs.get_mut(&job_id) else {
            return 0;
        };

        let mut delivered = 0;
        observers.retain(|conn_id, conn| match conn.sender.send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                tracing::debug!(job_id = %job_id, conn_id = %conn_id, "Dropping dead observer");
                false
            }
        });

        if observers.is_empty() {
            jobs.remove(&job_id);
        }
        delivered
    }

    /// Send a text line to every observer of `job_id`.
    pub async fn broadcast_text(&self, job_id: JobId, text: impl Into<String>) -> usize {
        self.broadcast(job_id, Message::Text(text.into().into())).await
    }

    /// Send a Close frame to every observer of `job_id` and forget the job.
    ///
    /// Returns the number of observers that were attached.
    pub async fn close_all(&self, job_id: JobId, code: u16, reason: &str) -> usize {
        let Some(observers) = self.jobs.write().await.remove(&job_id) else {
            return 0;
        };
        for conn in observers.values() {
            let frame = CloseFrame {
                code,
                reason: reason.into(),
            };
            let _ = conn.sender.send(Message::Close(Some(frame)));
        }
        tracing::debug!(job_id = %job_id, count = observers.len(), reason, "Closed job observers");
        observers.len()
    }

    /// Number of observers attached to `job_id`.
    pub async fn observer_count(&self, job_id: JobId) -> usize {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .map_or(0, HashMap::len)
    }

    /// Total number of attached observers across all jobs.
    pub async fn connection_count(&self) -> usize {
        self.jobs.read().await.values().map(HashMap::len).sum()
    }

    /// Number of jobs with at least one observer.
    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Send a Ping frame to every attached observer.
    pub async fn ping_all(&self) {
        let jobs = self.jobs.read().await;
        for conn in jobs.values().flat_map(HashMap::values) {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every observer of every job, then clear.
    ///
    /// Used during graceful shutdown.
    pub async fn shutdown_all(&self) {
        let mut jobs = self.jobs.write().await;
        let count: usize = jobs.values().map(HashMap::len).sum();
        for conn in jobs.values().flat_map(HashMap::values) {
            let _ = conn.sender.send(Message::Close(None));
        }
        jobs.clear();
        tracing::info!(count, "Closed all observer connections");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
