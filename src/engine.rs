//! Script engine contracts
//!
//! The engine itself is an external collaborator. These traits are the
//! only surface the bridge needs from it: open a session against a host,
//! submit one command, stream back result values, and report error
//! objects asynchronously on a channel.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use crate::command::CommandSpec;
use crate::error::BridgeError;
use crate::host::Host;
use crate::location::Frame;

/// A structured error raised by the running script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorObject {
    /// Rendered error message
    pub message: String,
    /// Script stack trace text, one frame per line
    pub stack_trace: Option<String>,
    /// Where the failing command was invoked
    pub invocation: Option<Frame>,
}

impl ErrorObject {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: None,
            invocation: None,
        }
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn with_invocation(mut self, frame: Frame) -> Self {
        self.invocation = Some(frame);
        self
    }
}

/// A runtime fault raised while a command runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineFault {
    /// Uncaught script failure; reported as a diagnostic
    Script(ErrorObject),
    /// Failure of the engine or host itself; fatal
    Host(String),
}

/// Where a result value sits relative to a tabular rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatRole {
    /// A plain value, rendered on its own
    Plain,
    /// Part of a still-open formatting run
    Part,
    /// Closes the current formatting run
    End,
}

/// A value produced by the engine's result pipeline
pub trait ResultObject: Send + 'static {
    fn format_role(&self) -> FormatRole {
        FormatRole::Plain
    }
}

impl ResultObject for String {}

/// Renders result values with the engine's own to-string conventions
pub trait Stringifier<V>: Send + Sync {
    fn render(&self, value: &V) -> String;

    /// Render a whole formatting run as one block of text
    fn render_run(&self, run: &[V]) -> String;
}

/// Reports the engine's innermost live call-stack frame
pub trait CallStack: Send + Sync {
    fn current_frame(&self) -> Option<Frame>;
}

/// Sending half of the asynchronous error stream
pub type ErrorSender = Sender<ErrorObject>;

/// Result values of one submitted command, in pipeline order
pub type ResultStream<'a, V> = Box<dyn Iterator<Item = Result<V, EngineFault>> + 'a>;

/// An embeddable script engine
pub trait ScriptEngine {
    type Value: ResultObject;
    type Session: EngineSession<Value = Self::Value>;

    /// Open one session that writes console output to `host` and pushes
    /// every error object onto `errors` as it occurs.
    ///
    /// The session owns `errors`; dropping the session closes the stream.
    fn open(
        &self,
        host: Arc<dyn Host>,
        errors: ErrorSender,
        env: &[(String, String)],
    ) -> Result<Self::Session, BridgeError>;

    fn call_stack(&self) -> Option<Arc<dyn CallStack>> {
        None
    }
}

/// A live engine session
pub trait EngineSession {
    type Value: ResultObject;

    /// Submit the command. Script specs run as a script line; others run as
    /// a named command with `bound_parameters` attached.
    fn submit(&mut self, command: &CommandSpec) -> Result<ResultStream<'_, Self::Value>, EngineFault>;
}

/// Renders strings as themselves, one line each
#[derive(Debug, Clone, Copy, Default)]
pub struct LineStringifier;

impl Stringifier<String> for LineStringifier {
    fn render(&self, value: &String) -> String {
        format!("{}\n", value)
    }

    fn render_run(&self, run: &[String]) -> String {
        run.iter().map(|v| self.render(v)).collect()
    }
}
