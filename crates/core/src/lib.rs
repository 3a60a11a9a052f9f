//! Shared types for the crewcast job streaming service.
//!
//! Everything in here is free of I/O: identifiers, the job status model,
//! the observer-facing [`LogMessage`](log_message::LogMessage) value and its
//! formatter, and the terminal envelope sent once per job.

pub mod error;
pub mod job_events;
pub mod log_message;
pub mod outcome;
pub mod status;
pub mod types;
