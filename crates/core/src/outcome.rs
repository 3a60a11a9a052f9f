//! The terminal envelope sent exactly once per job.

use serde_json::{json, Value};

use crate::job_events::{CANCELLED_REASON, FINAL_RESULT_MARKER};
use crate::status::JobStatus;

/// How a job ended, as reported to its observers.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalOutcome {
    /// The engine returned a result.
    Completed(Value),
    /// The engine failed; carries the summarized reason.
    Failed(String),
    Cancelled,
}

impl TerminalOutcome {
    /// The terminal job status this outcome corresponds to.
    pub fn status(&self) -> JobStatus {
        match self {
            TerminalOutcome::Completed(_) => JobStatus::Completed,
            TerminalOutcome::Failed(_) => JobStatus::Failed,
            TerminalOutcome::Cancelled => JobStatus::Cancelled,
        }
    }

    /// Machine-parseable payload: `{"result": ..}` or `{"error": ..}`.
    pub fn payload(&self) -> Value {
        match self {
            TerminalOutcome::Completed(result) => json!({ "result": result }),
            TerminalOutcome::Failed(reason) => json!({ "error": reason }),
            TerminalOutcome::Cancelled => json!({ "error": CANCELLED_REASON }),
        }
    }

    /// The full terminal line, marker included.
    pub fn render(&self) -> String {
        format!("{FINAL_RESULT_MARKER}{}", self.payload())
    }

    /// Reason text attached to the close frame that follows the terminal line.
    pub fn close_reason(&self) -> &'static str {
        match self {
            TerminalOutcome::Completed(_) => "Job completed",
            TerminalOutcome::Failed(_) => "Job failed",
            TerminalOutcome::Cancelled => "Job cancelled",
        }
    }
}

/// Split a terminal line back into its payload.
///
/// Returns `None` for ordinary progress lines.
pub fn parse_terminal(line: &str) -> Option<Value> {
    let payload = line.strip_prefix(FINAL_RESULT_MARKER)?;
    serde_json::from_str(payload).ok()
}
