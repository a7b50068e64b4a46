//! Diagnostic records and the sink that receives them
//!
//! A `DiagnosticRecord` is the only thing that leaves the bridge. It is
//! fully self-describing: severity, message and an optional location.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use parking_lot::Mutex;

/// How a record should be treated by the build log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Regular console output
    Info,
    /// Debug and verbose text
    LowPriorityInfo,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::LowPriorityInfo => "low",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// A located, severity-tagged unit of output.
///
/// `line` and `column` are 0 when unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    pub severity: Severity,
    pub message: String,
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl DiagnosticRecord {
    /// A record with no location
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            file: None,
            line: 0,
            column: 0,
        }
    }

    pub fn at(mut self, file: Option<String>, line: u32, column: u32) -> Self {
        self.file = file;
        self.line = line;
        self.column = column;
        self
    }
}

impl fmt::Display for DiagnosticRecord {
    /// Canonical build-log form: `file(line,col): warning : message`.
    /// Info records print their message only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Info | Severity::LowPriorityInfo => write!(f, "{}", self.message),
            Severity::Warning | Severity::Error => {
                if let Some(ref file) = self.file {
                    write!(f, "{}", file)?;
                    match (self.line, self.column) {
                        (0, _) => {}
                        (line, 0) => write!(f, "({})", line)?,
                        (line, col) => write!(f, "({},{})", line, col)?,
                    }
                    write!(f, ": ")?;
                }
                write!(f, "{} : {}", self.severity, self.message)
            }
        }
    }
}

/// The external build-log consumer
pub trait Sink: Send + Sync {
    fn emit(&self, record: DiagnosticRecord);
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn emit(&self, record: DiagnosticRecord) {
        (**self).emit(record)
    }
}

/// Collects records in memory. Cloning shares the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<DiagnosticRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far
    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.records.lock().clone()
    }

    pub fn take(&self) -> Vec<DiagnosticRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl Sink for MemorySink {
    fn emit(&self, record: DiagnosticRecord) {
        self.records.lock().push(record);
    }
}

/// Writes records to stdout/stderr in canonical build-log form.
///
/// Info goes to stdout; warnings and errors go to stderr. Low priority
/// text is dropped unless `verbose` is set.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    pub verbose: bool,
}

impl Sink for ConsoleSink {
    fn emit(&self, record: DiagnosticRecord) {
        // A closed pipe must not abort the build step.
        let _ = match record.severity {
            Severity::LowPriorityInfo if !self.verbose => Ok(()),
            Severity::Info | Severity::LowPriorityInfo => {
                writeln!(std::io::stdout().lock(), "{}", record)
            }
            Severity::Warning | Severity::Error => {
                writeln!(std::io::stderr().lock(), "{}", record)
            }
        };
    }
}
