use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use crewcast_core::job_events::SYSTEM_TAG;
use futures::{SinkExt, StreamExt};

use crate::handlers::jobs::parse_job_id;
use crate::state::AppState;

/// HTTP handler that upgrades the connection to an observer WebSocket for
/// one job.
pub async fn ws_logs_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, raw_id))
}

/// Manage one observer connection after upgrade.
///
///   1. Attaches to the job through the supervisor, or reports that the
///      job is not running and closes.
///   2. Spawns a sender task that forwards the job's messages to the sink
///      and stops after the Close frame.
///   3. Reads inbound frames until the client leaves or the stream ends.
///   4. Detaches.
async fn handle_socket(mut socket: WebSocket, state: AppState, raw_id: String) {
    let conn_id = uuid::Uuid::new_v4();

    let attached = match parse_job_id(&raw_id) {
        Some(job_id) => state
            .supervisor
            .attach_observer(job_id, conn_id)
            .await
            .map(|rx| (job_id, rx)),
        None => None,
    };

    let Some((job_id, mut rx)) = attached else {
        tracing::info!(job_id = %raw_id, conn_id = %conn_id, "Observer for job that is not running");
        let notice = format!("{SYSTEM_TAG} Job {raw_id} is not running or has already finished.");
        let _ = socket.send(Message::Text(notice.into())).await;
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: "Job not running".into(),
        };
        let _ = socket.send(Message::Close(Some(frame))).await;
        return;
    };
    tracing::info!(job_id = %job_id, conn_id = %conn_id, "Observer connected");

    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                }
                // Observers only listen.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
        }
    }

    state.registry.detach(job_id, conn_id).await;
    send_task.abort();
    tracing::info!(job_id = %job_id, conn_id = %conn_id, "Observer disconnected");
}
