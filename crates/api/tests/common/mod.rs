#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::Message;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio::sync::mpsc;
use tower::ServiceExt;

use crewcast_api::config::ServerConfig;
use crewcast_api::engine::{JobSupervisor, SupervisorSettings};
use crewcast_api::router::build_app_router;
use crewcast_api::state::AppState;
use crewcast_api::ws::ConnectionRegistry;
use crewcast_events::{Cancelled, EngineContext, JobOutput, JobSpec, WorkEngine};

/// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        heartbeat_interval_secs: 30,
        log_payload_chars: 200,
        log_line_max_chars: 2000,
        cancel_grace_secs: 5,
        diagnostic_log_dir: None,
        pipeline_step_delay_ms: 0,
    }
}

pub fn test_settings() -> SupervisorSettings {
    SupervisorSettings {
        cancel_grace: Duration::from_millis(500),
        ..SupervisorSettings::default()
    }
}

/// Build application state around `engine`.
pub fn build_test_state(engine: Arc<dyn WorkEngine>) -> AppState {
    let config = test_config();
    let registry = Arc::new(ConnectionRegistry::new());
    let supervisor = JobSupervisor::new(engine, Arc::clone(&registry), test_settings());
    AppState {
        config: Arc::new(config),
        registry,
        supervisor,
    }
}

/// Build the full application router with all middleware layers.
pub fn build_test_app(state: AppState) -> Router {
    build_app_router(state, &test_config())
}

/// Serve `state` on an ephemeral local port.
pub async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_test_app(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Test engines
// ---------------------------------------------------------------------------

type RunFn = dyn Fn(&JobSpec, &EngineContext<'_>) -> anyhow::Result<JobOutput> + Send + Sync;

/// Work engine driven by a closure.
pub struct FnEngine {
    run: Box<RunFn>,
}

impl FnEngine {
    pub fn new<F>(run: F) -> Arc<Self>
    where
        F: Fn(&JobSpec, &EngineContext<'_>) -> anyhow::Result<JobOutput> + Send + Sync + 'static,
    {
        Arc::new(Self { run: Box::new(run) })
    }
}

impl WorkEngine for FnEngine {
    fn name(&self) -> &str {
        "test-engine"
    }

    fn run(&self, spec: &JobSpec, ctx: &EngineContext<'_>) -> anyhow::Result<JobOutput> {
        (self.run)(spec, ctx)
    }
}

/// One-shot latch the test opens once its observers are attached.
#[derive(Clone, Default)]
pub struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    pub fn open(&self) {
        let (lock, cvar) = &*self.0;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    /// Block until opened, honouring cancellation.
    pub fn wait(&self, ctx: &EngineContext<'_>) -> Result<(), Cancelled> {
        let (lock, cvar) = &*self.0;
        let mut open = lock.lock().unwrap();
        while !*open {
            ctx.checkpoint()?;
            open = cvar.wait_timeout(open, Duration::from_millis(10)).unwrap().0;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Observer helpers
// ---------------------------------------------------------------------------

/// Everything one observer received: text lines, then the close frame.
#[derive(Debug)]
pub struct Transcript {
    pub lines: Vec<String>,
    pub close: Option<(u16, String)>,
}

impl Transcript {
    /// Lines without the per-job start banner, which may or may not have
    /// been sent before the observer attached.
    pub fn body(&self) -> Vec<&str> {
        self.lines
            .iter()
            .map(String::as_str)
            .filter(|line| !line.starts_with("[SYSTEM] Pipeline starting"))
            .collect()
    }

    pub fn last(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or_default()
    }
}

/// Drain an observer channel until its Close frame (or end of channel).
pub async fn collect(mut rx: mpsc::UnboundedReceiver<Message>) -> Transcript {
    let mut lines = Vec::new();
    let close = loop {
        let next = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("observer stream stalled");
        match next {
            Some(Message::Text(text)) => lines.push(text.as_str().to_owned()),
            Some(Message::Close(frame)) => {
                break frame.map(|f| (f.code, f.reason.as_str().to_owned()));
            }
            Some(_) => {}
            None => break None,
        }
    };
    Transcript { lines, close }
}
