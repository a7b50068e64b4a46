//! Host adapter
//!
//! The engine talks to the outside world through a `Host`. `HostAdapter`
//! routes plain text through the line aggregator, resolves warnings and
//! errors into located records, and refuses every interactive request.
//!
//! All mutable state (pending line, open formatting run, counters) sits
//! behind one mutex, since error objects arrive from the error stream
//! while results are still being drained.

use std::fmt;
use std::sync::Arc;
use parking_lot::Mutex;
use crate::diagnostic::{DiagnosticRecord, Severity, Sink};
use crate::engine::{CallStack, ErrorObject, FormatRole, ResultObject, Stringifier};
use crate::location::{self, Frame, Location};
use crate::output::LineAggregator;

/// Fixed message for every refused interactive request
pub const NON_INTERACTIVE_MESSAGE: &str =
    "The host is in non-interactive mode. Read and Prompt functionality is not available.";

/// An interactive request that could not be served
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionError {
    pub message: String,
}

impl InteractionError {
    pub fn non_interactive() -> Self {
        Self {
            message: NON_INTERACTIVE_MESSAGE.into(),
        }
    }
}

impl fmt::Display for InteractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for InteractionError {}

/// Credentials returned by a credential prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_name: String,
    pub password: String,
}

/// User interaction capability behind read and prompt requests
pub trait Interaction: Send + Sync {
    fn read_line(&self) -> Result<String, InteractionError>;

    fn read_line_secure(&self) -> Result<String, InteractionError>;

    fn prompt(
        &self,
        caption: &str,
        message: &str,
        fields: &[String],
    ) -> Result<Vec<(String, String)>, InteractionError>;

    fn prompt_for_choice(
        &self,
        caption: &str,
        message: &str,
        choices: &[String],
        default_choice: usize,
    ) -> Result<usize, InteractionError>;

    fn prompt_for_credential(
        &self,
        caption: &str,
        message: &str,
        user_name: &str,
        target_name: &str,
    ) -> Result<Credential, InteractionError>;
}

/// Interaction that fails every request immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl Interaction for NonInteractive {
    fn read_line(&self) -> Result<String, InteractionError> {
        Err(InteractionError::non_interactive())
    }

    fn read_line_secure(&self) -> Result<String, InteractionError> {
        Err(InteractionError::non_interactive())
    }

    fn prompt(&self, _: &str, _: &str, _: &[String]) -> Result<Vec<(String, String)>, InteractionError> {
        Err(InteractionError::non_interactive())
    }

    fn prompt_for_choice(&self, _: &str, _: &str, _: &[String], _: usize) -> Result<usize, InteractionError> {
        Err(InteractionError::non_interactive())
    }

    fn prompt_for_credential(&self, _: &str, _: &str, _: &str, _: &str) -> Result<Credential, InteractionError> {
        Err(InteractionError::non_interactive())
    }
}

/// What an embedded engine may call on its host
pub trait Host: Send + Sync {
    /// Console text, possibly a fragment of a line
    fn write_text(&self, text: &str);

    fn write_debug(&self, message: &str);

    fn write_verbose(&self, message: &str);

    fn write_warning_line(&self, message: &str);

    /// An error raised without an error object
    fn write_error_line(&self, message: &str);

    fn write_error(&self, error: &ErrorObject);

    fn read_line(&self) -> Result<String, InteractionError>;

    fn read_line_secure(&self) -> Result<String, InteractionError>;

    fn prompt(
        &self,
        caption: &str,
        message: &str,
        fields: &[String],
    ) -> Result<Vec<(String, String)>, InteractionError>;

    fn prompt_for_choice(
        &self,
        caption: &str,
        message: &str,
        choices: &[String],
        default_choice: usize,
    ) -> Result<usize, InteractionError>;

    fn prompt_for_credential(
        &self,
        caption: &str,
        message: &str,
        user_name: &str,
        target_name: &str,
    ) -> Result<Credential, InteractionError>;
}

/// Per-severity record counts for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub infos: usize,
    pub low_priority: usize,
    pub warnings: usize,
    pub errors: usize,
}

impl RunSummary {
    /// No error records were emitted
    pub fn succeeded(&self) -> bool {
        self.errors == 0
    }

    fn count(&mut self, severity: Severity) {
        match severity {
            Severity::Info => self.infos += 1,
            Severity::LowPriorityInfo => self.low_priority += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Error => self.errors += 1,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} warning(s), {} error(s)", self.warnings, self.errors)
    }
}

struct HostState<V> {
    lines: LineAggregator,
    format_run: Vec<V>,
    summary: RunSummary,
    ended: bool,
}

/// The diagnostic translator installed as the engine's host
pub struct HostAdapter<V> {
    sink: Arc<dyn Sink>,
    state: Mutex<HostState<V>>,
    interaction: Box<dyn Interaction>,
    call_stack: Option<Arc<dyn CallStack>>,
}

impl<V: ResultObject> HostAdapter<V> {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            sink,
            state: Mutex::new(HostState {
                lines: LineAggregator::new(),
                format_run: Vec::new(),
                summary: RunSummary::default(),
                ended: false,
            }),
            interaction: Box::new(NonInteractive),
            call_stack: None,
        }
    }

    pub fn with_call_stack(mut self, call_stack: Option<Arc<dyn CallStack>>) -> Self {
        self.call_stack = call_stack;
        self
    }

    pub fn with_interaction(mut self, interaction: Box<dyn Interaction>) -> Self {
        self.interaction = interaction;
        self
    }

    /// Hand one pipeline result to the console.
    ///
    /// Formatting parts are held back until the run's closing value
    /// arrives, so a table is rendered as a single block.
    pub fn write_result(&self, value: V, stringifier: &dyn Stringifier<V>) {
        let text = match value.format_role() {
            FormatRole::Plain => stringifier.render(&value),
            FormatRole::Part => {
                self.state.lock().format_run.push(value);
                return;
            }
            FormatRole::End => {
                let run = {
                    let mut state = self.state.lock();
                    state.format_run.push(value);
                    std::mem::take(&mut state.format_run)
                };
                stringifier.render_run(&run)
            }
        };
        self.write_text(&text);
    }

    /// Flush the partial line. Only the first call has any effect.
    pub fn end_session(&self) {
        let mut state = self.state.lock();
        if state.ended {
            return;
        }
        state.ended = true;
        if !state.format_run.is_empty() {
            tracing::warn!(
                values = state.format_run.len(),
                "formatting run never closed; dropping it"
            );
            state.format_run.clear();
        }
        let HostState { lines, summary, .. } = &mut *state;
        if lines.end_session(self.sink.as_ref()) {
            summary.infos += 1;
        }
    }

    pub fn summary(&self) -> RunSummary {
        self.state.lock().summary
    }

    fn emit(&self, record: DiagnosticRecord) {
        let mut state = self.state.lock();
        state.summary.count(record.severity);
        self.sink.emit(record);
    }

    fn emit_located(&self, severity: Severity, loc: Location) {
        self.emit(DiagnosticRecord::new(severity, loc.message).at(loc.file, loc.line, loc.column));
    }

    fn current_frame(&self) -> Option<Frame> {
        self.call_stack.as_ref().and_then(|cs| cs.current_frame())
    }

    /// Surface a refused interactive request as an error diagnostic.
    fn refuse<T>(&self, result: Result<T, InteractionError>) -> Result<T, InteractionError> {
        result.map_err(|err| {
            let mut error = ErrorObject::new(err.message.clone());
            error.invocation = self.current_frame();
            self.write_error(&error);
            err
        })
    }
}

impl<V: ResultObject> Host for HostAdapter<V> {
    fn write_text(&self, text: &str) {
        let mut state = self.state.lock();
        let HostState { lines, summary, .. } = &mut *state;
        if lines.write(text, self.sink.as_ref()) {
            summary.infos += 1;
        }
    }

    fn write_debug(&self, message: &str) {
        self.emit(DiagnosticRecord::new(Severity::LowPriorityInfo, message));
    }

    fn write_verbose(&self, message: &str) {
        self.emit(DiagnosticRecord::new(Severity::LowPriorityInfo, message));
    }

    fn write_warning_line(&self, message: &str) {
        let frame = self.current_frame();
        self.emit_located(Severity::Warning, location::resolve_message(message, frame.as_ref()));
    }

    fn write_error_line(&self, message: &str) {
        let frame = self.current_frame();
        self.emit_located(Severity::Error, location::resolve_message(message, frame.as_ref()));
    }

    fn write_error(&self, error: &ErrorObject) {
        let loc = location::resolve(
            &error.message,
            error.stack_trace.as_deref(),
            error.invocation.as_ref(),
        );
        self.emit_located(Severity::Error, loc);
    }

    fn read_line(&self) -> Result<String, InteractionError> {
        self.refuse(self.interaction.read_line())
    }

    fn read_line_secure(&self) -> Result<String, InteractionError> {
        self.refuse(self.interaction.read_line_secure())
    }

    fn prompt(
        &self,
        caption: &str,
        message: &str,
        fields: &[String],
    ) -> Result<Vec<(String, String)>, InteractionError> {
        self.refuse(self.interaction.prompt(caption, message, fields))
    }

    fn prompt_for_choice(
        &self,
        caption: &str,
        message: &str,
        choices: &[String],
        default_choice: usize,
    ) -> Result<usize, InteractionError> {
        self.refuse(self.interaction.prompt_for_choice(caption, message, choices, default_choice))
    }

    fn prompt_for_credential(
        &self,
        caption: &str,
        message: &str,
        user_name: &str,
        target_name: &str,
    ) -> Result<Credential, InteractionError> {
        self.refuse(self.interaction.prompt_for_credential(caption, message, user_name, target_name))
    }
}
