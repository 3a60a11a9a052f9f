//! Work-engine boundary and the translation of engine activity into
//! observer-facing log messages.
//!
//! - [`WorkEngine`] / [`EngineContext`] -- the contract a job runner
//!   implements and the handle it gets while running.
//! - [`EngineEvent`] -- the closed set of recognized lifecycle callbacks
//!   plus an `Unstructured` catch-all.
//! - [`EventTranslator`] -- turns callbacks into [`LogMessage`]s.
//! - [`LineBuffer`] and [`capture`] -- turn raw console narration into
//!   pass-through messages, scoped to the job's execution context.
//! - [`LogSink`] -- where produced messages go.
//!
//! [`LogMessage`]: crewcast_core::log_message::LogMessage

pub mod capture;
pub mod engine;
pub mod event;
pub mod line_buffer;
pub mod sink;
pub mod thought;
pub mod translator;

pub use capture::{CaptureError, CaptureGuard, Console};
pub use engine::{Cancelled, EngineCallbacks, EngineContext, JobOutput, JobSpec, WorkEngine};
pub use event::EngineEvent;
pub use line_buffer::LineBuffer;
pub use sink::LogSink;
pub use translator::{EventTranslator, DIAGNOSTIC_TARGET};
