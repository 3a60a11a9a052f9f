//! Isolation of the reasoning part of an agent action log.
//!
//! Agent action logs are free text of the form
//!
//! ```text
//! Thought: I should look at the columns first
//! and then the row count.
//! Action: Read CSV
//! Action Input: {"path": "data.csv"}
//! ```
//!
//! Only the intent-bearing lines are forwarded to observers.

const THOUGHT_MARKER: &str = "thought:";
const ACTION_MARKERS: [&str; 2] = ["action:", "action input:"];

/// Collect the lines after each `Thought:` marker up to the next action
/// marker and join them with single spaces.
///
/// Returns `None` when the log carries no reasoning.
pub fn extract_thought(log: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    let mut capturing = false;

    for line in log.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(rest) = strip_marker(line, THOUGHT_MARKER) {
            let rest = rest.trim();
            if !rest.is_empty() {
                parts.push(rest);
            }
            capturing = true;
        } else if is_action_line(line) {
            capturing = false;
        } else if capturing {
            parts.push(line);
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Whether a line starts a `Thought:` block (case-insensitive).
pub fn is_thought_line(line: &str) -> bool {
    strip_marker(line.trim_start(), THOUGHT_MARKER).is_some()
}

fn is_action_line(line: &str) -> bool {
    ACTION_MARKERS
        .iter()
        .any(|marker| strip_marker(line, marker).is_some())
}

fn strip_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let head = line.get(..marker.len())?;
    if head.eq_ignore_ascii_case(marker) {
        Some(&line[marker.len()..])
    } else {
        None
    }
}
