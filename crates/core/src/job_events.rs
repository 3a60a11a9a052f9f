//! Literal markers of the observer wire protocol.
//!
//! Observers parse these prefixes, so they are part of the public contract
//! and must not change between releases.

/// Prefix of the single terminal line sent per job.
pub const FINAL_RESULT_MARKER: &str = "[FINAL_RESULT]";

/// Prefix of service-generated progress lines.
pub const SYSTEM_TAG: &str = "[SYSTEM]";

/// Prefix of service-generated error lines.
pub const SYSTEM_ERROR_TAG: &str = "[SYSTEM-ERROR]";

/// Error reason carried by the terminal payload of a cancelled job.
pub const CANCELLED_REASON: &str = "cancelled";

/// Appended to any text that was cut by a truncation bound.
pub const TRUNCATION_MARKER: &str = "...";

/// Default bound on payloads embedded in structured messages.
pub const DEFAULT_PAYLOAD_CHARS: usize = 200;

/// Default bound on the body of one structured message.
pub const DEFAULT_MAX_LINE_CHARS: usize = 2000;
