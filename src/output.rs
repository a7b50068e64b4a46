//! Output line aggregation
//!
//! The engine writes console text in arbitrary fragments (`Write-Host -NoNewline`,
//! separate newline writes, partial lines from a dying script). Fragments are
//! buffered until a line terminator arrives and then emitted as one record.

use crate::diagnostic::{DiagnosticRecord, Severity, Sink};

/// Buffers fragments into logical lines.
///
/// Lives for one engine session.
#[derive(Debug, Default)]
pub struct LineAggregator {
    pending: String,
}

impl LineAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text not yet terminated by a line break
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Append a fragment; a fragment ending in `\n` or `\r\n` completes the line.
    ///
    /// Returns true when a record was emitted.
    pub fn write(&mut self, fragment: &str, sink: &dyn Sink) -> bool {
        match strip_terminator(fragment) {
            Some(body) => {
                self.pending.push_str(body);
                self.flush(sink)
            }
            None => {
                self.pending.push_str(fragment);
                false
            }
        }
    }

    /// Flush a partial line left behind when the session ends.
    pub fn end_session(&mut self, sink: &dyn Sink) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.write("\n", sink)
    }

    fn flush(&mut self, sink: &dyn Sink) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let line = std::mem::take(&mut self.pending);
        sink.emit(DiagnosticRecord::new(Severity::Info, line));
        true
    }
}

fn strip_terminator(fragment: &str) -> Option<&str> {
    fragment
        .strip_suffix("\r\n")
        .or_else(|| fragment.strip_suffix('\n'))
}
