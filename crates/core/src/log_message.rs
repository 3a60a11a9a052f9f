//! Observer-facing log messages and their single-line rendering.
//!
//! A [`LogMessage`] is an immutable value produced by the event translator
//! or the output capture. [`LogFormatter`] turns it into the exact text
//! frame an observer receives. Formatting is pure: same input, same line.

use std::borrow::Cow;

use serde::Serialize;

use crate::job_events::{SYSTEM_ERROR_TAG, SYSTEM_TAG, TRUNCATION_MARKER};
use crate::types::{short_id, JobId};

/// Event kind used for service-generated informational lines.
pub const KIND_SYSTEM: &str = "system";

/// Event kind used for service-generated error lines.
pub const KIND_ERROR: &str = "error";

/// Event kind used for raw console lines.
pub const KIND_CONSOLE: &str = "console";

/// Which sub-phase of the job produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    /// Generated by the service itself (start, cancel, error notices).
    System,
    /// Job and sub-unit lifecycle.
    Pipeline,
    ModelCall,
    ToolCall,
    /// An agent handing work to another agent.
    Delegation,
    /// Agent reasoning, planned actions and step results.
    Agent,
    /// Free-form text callbacks.
    Text,
    /// Captured console narration, passed through verbatim.
    RawConsole,
    /// Callback kinds the translator has no dedicated rendering for.
    Unrecognized,
}

impl LogSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LogSource::System => "system",
            LogSource::Pipeline => "pipeline",
            LogSource::ModelCall => "model_call",
            LogSource::ToolCall => "tool_call",
            LogSource::Delegation => "delegation",
            LogSource::Agent => "agent",
            LogSource::Text => "text",
            LogSource::RawConsole => "raw_console",
            LogSource::Unrecognized => "unrecognized",
        }
    }
}

/// One ordered, tagged unit of observer-facing output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogMessage {
    pub source: LogSource,
    /// Short event kind, shown in brackets for structured messages.
    pub kind: String,
    pub body: String,
    /// `true` for opaque raw text that is forwarded as-is; `false` for
    /// framework-recognized events that may be summarized and truncated.
    pub pass_through: bool,
}

impl LogMessage {
    /// A framework-recognized event.
    pub fn structured(source: LogSource, kind: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            source,
            kind: kind.into(),
            body: body.into(),
            pass_through: false,
        }
    }

    /// One line of captured console output.
    pub fn raw(line: impl Into<String>) -> Self {
        Self {
            source: LogSource::RawConsole,
            kind: KIND_CONSOLE.to_string(),
            body: line.into(),
            pass_through: true,
        }
    }

    /// A `[SYSTEM]` notice.
    pub fn system(text: impl Into<String>) -> Self {
        Self::structured(LogSource::System, KIND_SYSTEM, text)
    }

    /// A `[SYSTEM-ERROR]` notice.
    pub fn system_error(text: impl Into<String>) -> Self {
        Self::structured(LogSource::System, KIND_ERROR, text)
    }
}

/// Cut `text` to at most `max_chars` characters.
///
/// The truncation marker is appended only when something was actually cut.
pub fn truncate(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        None => Cow::Borrowed(text),
        Some((byte_idx, _)) => Cow::Owned(format!("{}{TRUNCATION_MARKER}", &text[..byte_idx])),
    }
}

/// Renders [`LogMessage`]s of one job into display-ready lines.
#[derive(Debug, Clone)]
pub struct LogFormatter {
    prefix: String,
    max_body_chars: usize,
}

impl LogFormatter {
    pub fn new(job_id: &JobId, max_body_chars: usize) -> Self {
        Self {
            prefix: format!("[Job:{}]", short_id(job_id)),
            max_body_chars,
        }
    }

    /// Render one message as a single line.
    ///
    /// Pass-through messages are returned verbatim, system notices get the
    /// `[SYSTEM]` / `[SYSTEM-ERROR]` tag, and every other structured message
    /// is rendered as `[Job:<id>] [<kind>] <body>` with the body bounded.
    pub fn format(&self, message: &LogMessage) -> String {
        if message.pass_through {
            return message.body.clone();
        }

        let body = truncate(&message.body, self.max_body_chars);
        match message.source {
            LogSource::System if message.kind == KIND_ERROR => {
                format!("{SYSTEM_ERROR_TAG} {body}")
            }
            LogSource::System => format!("{SYSTEM_TAG} {body}"),
            _ => format!("{} [{}] {}", self.prefix, message.kind, body),
        }
    }
}
