//! Reassembles raw output fragments into complete lines.

/// Accumulates partial writes and yields complete lines.
///
/// Lines are split on `\n`, trimmed (which also drops a trailing `\r`),
/// and empty lines are skipped. Splitting happens on bytes so a multi-byte
/// character split across two writes is reassembled before decoding.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return every line it completed, in order.
    ///
    /// A trailing fragment without a terminator stays buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.partial.extend_from_slice(&rest[..pos]);
            rest = &rest[pos + 1..];
            let line = std::mem::take(&mut self.partial);
            if let Some(line) = clean(&line) {
                lines.push(line);
            }
        }

        self.partial.extend_from_slice(rest);
        lines
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<String> {
        self.push(chunk.as_bytes())
    }

    /// Take the residual partial line, if it has any non-blank content.
    ///
    /// The buffer is empty afterwards either way.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.partial);
        clean(&rest)
    }

    /// Bytes currently held back waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.partial.len()
    }
}

fn clean(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
