//! Job lifecycle tests against the supervisor directly.
//!
//! Each test runs a closure-driven engine and inspects exactly what the
//! job's observers receive, in order, up to and including the close frame.

mod common;

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::ws::Message;
use common::{collect, test_settings, FnEngine, Gate, WAIT};
use crewcast_api::engine::{CancelAck, JobSupervisor};
use crewcast_api::ws::ConnectionRegistry;
use crewcast_core::status::JobStatus;
use crewcast_core::types::short_id;
use crewcast_events::{EngineEvent, JobSpec, WorkEngine};
use serde_json::json;
use uuid::Uuid;

fn supervisor(engine: Arc<dyn WorkEngine>) -> (Arc<JobSupervisor>, Arc<ConnectionRegistry>) {
    let registry = Arc::new(ConnectionRegistry::new());
    let supervisor = JobSupervisor::new(engine, Arc::clone(&registry), test_settings());
    (supervisor, registry)
}

fn spec() -> JobSpec {
    JobSpec::new("analyze sales", "test-model")
}

/// Receive text lines until one equals `expected`.
async fn wait_for_line(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Message>, expected: &str) {
    loop {
        let next = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("line never arrived");
        match next {
            Some(Message::Text(text)) if text.as_str() == expected => return,
            Some(_) => {}
            None => panic!("stream ended before '{expected}'"),
        }
    }
}

// ---------------------------------------------------------------------------
// Test: successful job streams console lines, then the result, then closes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completed_job_streams_lines_then_result() {
    let gate = Gate::default();
    let engine_gate = gate.clone();
    let engine = FnEngine::new(move |_, ctx| {
        engine_gate.wait(ctx)?;
        let mut console = ctx.console();
        write!(console, "loading\npartial")?;
        write!(console, "more\n")?;
        Ok(json!(42).into())
    });
    let (supervisor, registry) = supervisor(engine);

    let job_id = supervisor.start(spec()).await;
    let first = supervisor.attach_observer(job_id, Uuid::new_v4()).await.unwrap();
    let second = supervisor.attach_observer(job_id, Uuid::new_v4()).await.unwrap();
    gate.open();

    let (first, second) = tokio::join!(collect(first), collect(second));
    for transcript in [&first, &second] {
        assert_eq!(
            transcript.body(),
            vec!["loading", "partialmore", r#"[FINAL_RESULT]{"result":42}"#]
        );
        assert_eq!(transcript.close, Some((1000, "Job completed".to_string())));
    }

    assert!(supervisor.snapshot(job_id).await.is_none());
    assert_eq!(registry.job_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: every attached observer gets the same stream; dead ones are dropped
// ---------------------------------------------------------------------------

#[tokio::test]
async fn observers_receive_identical_streams() {
    let gate = Gate::default();
    let engine_gate = gate.clone();
    let engine = FnEngine::new(move |_, ctx| {
        engine_gate.wait(ctx)?;
        ctx.emit(EngineEvent::ToolStarted {
            tool: "Read CSV".into(),
            input: "data.csv".into(),
        });
        Ok(json!("done").into())
    });
    let (supervisor, registry) = supervisor(engine);

    let job_id = supervisor.start(spec()).await;
    let first = supervisor.attach_observer(job_id, Uuid::new_v4()).await.unwrap();
    let second = supervisor.attach_observer(job_id, Uuid::new_v4()).await.unwrap();
    let gone = supervisor.attach_observer(job_id, Uuid::new_v4()).await.unwrap();
    assert_eq!(registry.observer_count(job_id).await, 3);
    drop(gone);
    gate.open();

    let (first, second) = tokio::join!(collect(first), collect(second));
    let expected_tool_line = format!(
        "[Job:{}] [Tool Start] Running tool 'Read CSV' with input: 'data.csv'",
        short_id(&job_id)
    );
    assert_eq!(
        first.body(),
        vec![expected_tool_line.as_str(), r#"[FINAL_RESULT]{"result":"done"}"#]
    );
    assert_eq!(first.lines, second.lines);
    assert_eq!(registry.connection_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: engine failure flushes the partial line, then reports the error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_job_reports_error_after_residual_output() {
    let gate = Gate::default();
    let engine_gate = gate.clone();
    let engine = FnEngine::new(move |_, ctx| {
        engine_gate.wait(ctx)?;
        write!(ctx.console(), "half a line")?;
        anyhow::bail!("Missing API key")
    });
    let (supervisor, _) = supervisor(engine);

    let job_id = supervisor.start(spec()).await;
    let rx = supervisor.attach_observer(job_id, Uuid::new_v4()).await.unwrap();
    gate.open();

    let transcript = collect(rx).await;
    assert_eq!(
        transcript.body(),
        vec![
            "half a line",
            "[SYSTEM-ERROR] Missing API key",
            r#"[FINAL_RESULT]{"error":"Missing API key"}"#,
        ]
    );
    assert_eq!(transcript.close, Some((1000, "Job failed".to_string())));
}

// ---------------------------------------------------------------------------
// Test: a panicking engine is reported as a failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn panicking_engine_is_reported_as_failure() {
    let gate = Gate::default();
    let engine_gate = gate.clone();
    let engine = FnEngine::new(move |_, ctx| {
        engine_gate.wait(ctx)?;
        panic!("boom");
    });
    let (supervisor, _) = supervisor(engine);

    let job_id = supervisor.start(spec()).await;
    let rx = supervisor.attach_observer(job_id, Uuid::new_v4()).await.unwrap();
    gate.open();

    let transcript = collect(rx).await;
    assert_eq!(
        transcript.body(),
        vec![
            "[SYSTEM-ERROR] engine panicked: boom",
            r#"[FINAL_RESULT]{"error":"engine panicked: boom"}"#,
        ]
    );
}

// ---------------------------------------------------------------------------
// Test: cancellation mid-run ends with the cancelled terminal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_job_reports_cancelled() {
    let gate = Gate::default();
    let engine_gate = gate.clone();
    let engine = FnEngine::new(move |_, ctx| {
        engine_gate.wait(ctx)?;
        writeln!(ctx.console(), "working")?;
        loop {
            ctx.sleep(Duration::from_millis(50))?;
        }
    });
    let (supervisor, _) = supervisor(engine);

    let job_id = supervisor.start(spec()).await;
    let mut rx = supervisor.attach_observer(job_id, Uuid::new_v4()).await.unwrap();
    gate.open();
    wait_for_line(&mut rx, "working").await;

    assert_eq!(
        supervisor.snapshot(job_id).await.unwrap().status,
        JobStatus::Running
    );
    assert_eq!(supervisor.cancel(job_id).await, CancelAck::CancellationRequested);

    let transcript = collect(rx).await;
    assert_eq!(
        transcript.lines,
        vec![
            "[SYSTEM] Cancellation requested.",
            "[SYSTEM] Job cancelled by user.",
            r#"[FINAL_RESULT]{"error":"cancelled"}"#,
        ]
    );
    assert_eq!(transcript.close, Some((1000, "Job cancelled".to_string())));
    assert_eq!(supervisor.cancel(job_id).await, CancelAck::NotRunning);
}

// ---------------------------------------------------------------------------
// Test: a cancel right after start keeps the start banner first and never
// launches the engine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn immediate_cancel_keeps_banner_first() {
    let launched = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&launched);
    let engine = FnEngine::new(move |_, _| {
        flag.store(true, Ordering::SeqCst);
        Ok(json!(null).into())
    });
    let (supervisor, _) = supervisor(engine);

    let job_id = supervisor.start(JobSpec::new("analyze sales", "m")).await;
    let rx = supervisor.attach_observer(job_id, Uuid::new_v4()).await.unwrap();
    assert_eq!(supervisor.cancel(job_id).await, CancelAck::CancellationRequested);

    let transcript = collect(rx).await;
    assert_eq!(
        transcript.lines,
        vec![
            "[SYSTEM] Pipeline starting (engine: test-engine, model: m)...",
            "[SYSTEM] Cancellation requested.",
            "[SYSTEM] Job cancelled by user.",
            r#"[FINAL_RESULT]{"error":"cancelled"}"#,
        ]
    );
    assert_eq!(transcript.close, Some((1000, "Job cancelled".to_string())));
    assert!(!launched.load(Ordering::SeqCst));
}

// ---------------------------------------------------------------------------
// Test: an engine that ignores cancellation is cut loose after the grace
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unresponsive_engine_is_finalized_after_grace_period() {
    let engine_done = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&engine_done);
    let gate = Gate::default();
    let engine_gate = gate.clone();
    let engine = FnEngine::new(move |_, ctx| {
        engine_gate.wait(ctx)?;
        std::thread::sleep(Duration::from_secs(3));
        writeln!(ctx.console(), "too late")?;
        flag.store(true, Ordering::SeqCst);
        Ok(json!(null).into())
    });
    let (supervisor, _) = supervisor(engine);

    let job_id = supervisor.start(spec()).await;
    let rx = supervisor.attach_observer(job_id, Uuid::new_v4()).await.unwrap();
    gate.open();
    tokio::time::sleep(Duration::from_millis(50)).await;
    supervisor.cancel(job_id).await;

    let transcript = collect(rx).await;
    assert!(!engine_done.load(Ordering::SeqCst));
    assert_eq!(transcript.last(), r#"[FINAL_RESULT]{"error":"cancelled"}"#);
    assert!(!transcript.lines.iter().any(|l| l == "too late"));
}

// ---------------------------------------------------------------------------
// Test: observers cannot attach to finished or unknown jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn attach_after_completion_is_refused() {
    let engine = FnEngine::new(|_, _| Ok(json!(1).into()));
    let (supervisor, registry) = supervisor(engine);

    let job_id = supervisor.start(spec()).await;
    tokio::time::timeout(WAIT, async {
        while supervisor.snapshot(job_id).await.is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert!(supervisor.attach_observer(job_id, Uuid::new_v4()).await.is_none());
    assert!(supervisor.attach_observer(Uuid::new_v4(), Uuid::new_v4()).await.is_none());
    assert_eq!(registry.connection_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: cancelling an unknown job is a no-op
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_unknown_job_is_not_running() {
    let (supervisor, _) = supervisor(FnEngine::new(|_, _| Ok(json!(1).into())));
    assert_eq!(supervisor.cancel(Uuid::new_v4()).await, CancelAck::NotRunning);
}

// ---------------------------------------------------------------------------
// Test: concurrent jobs keep their console output apart
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_jobs_do_not_mix_output() {
    let gate = Gate::default();
    let engine_gate = gate.clone();
    let engine = FnEngine::new(move |spec, ctx| {
        engine_gate.wait(ctx)?;
        for step in 0..5 {
            writeln!(ctx.console(), "{} step {step}", spec.task)?;
            ctx.sleep(Duration::from_millis(5))?;
        }
        Ok(json!(spec.task).into())
    });
    let (supervisor, _) = supervisor(engine);

    let a = supervisor.start(JobSpec::new("alpha", "m")).await;
    let b = supervisor.start(JobSpec::new("beta", "m")).await;
    let rx_a = supervisor.attach_observer(a, Uuid::new_v4()).await.unwrap();
    let rx_b = supervisor.attach_observer(b, Uuid::new_v4()).await.unwrap();
    assert_eq!(supervisor.list().await.len(), 2);
    gate.open();

    let (ta, tb) = tokio::join!(collect(rx_a), collect(rx_b));
    let body_a = ta.body();
    let body_b = tb.body();
    assert_eq!(body_a.len(), 6);
    assert_eq!(body_b.len(), 6);
    assert!(body_a[..5].iter().all(|l| l.starts_with("alpha step")));
    assert!(body_b[..5].iter().all(|l| l.starts_with("beta step")));
    assert_eq!(body_a[5], r#"[FINAL_RESULT]{"result":"alpha"}"#);
}

// ---------------------------------------------------------------------------
// Test: shutdown cancels running jobs and waits for them
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_cancels_running_jobs() {
    let engine = FnEngine::new(|_, ctx| loop {
        ctx.sleep(Duration::from_millis(20))?;
    });
    let (supervisor, _) = supervisor(engine);

    let job_id = supervisor.start(spec()).await;
    let rx = supervisor.attach_observer(job_id, Uuid::new_v4()).await.unwrap();

    supervisor.shutdown(WAIT).await;
    assert_eq!(supervisor.running_count().await, 0);

    let transcript = collect(rx).await;
    assert_matches!(transcript.close, Some((1000, ref reason)) if reason == "Job cancelled");
}
