//! emx-scriptbridge: run scripts in an embedded engine, report diagnostics
//!
//! Runs a script expression or script file inside a script engine session
//! and translates everything the engine says into build diagnostics a
//! build system can display: informational lines, warnings and errors,
//! each optionally located at a file, line and column.
//!
//! # Overview
//!
//! ```text
//! CommandBuilder --build--> CommandSpec
//!                              |
//!                           Runner --open--> ScriptEngine session
//!                              |                 |        \
//!                          results          host calls   error stream
//!                              \                 |        /
//!                               +---> HostAdapter <------+
//!                                         |
//!                                   LineAggregator / location::resolve
//!                                         |
//!                                       Sink
//! ```
//!
//! # Inputs
//!
//! | Input | Description |
//! |-------|-------------|
//! | `expression` | Script text to run |
//! | `file` | Script file to run (`.ps1`) |
//! | `arguments` | Raw argument text appended to a file invocation |
//! | `auto_parameters` | Name/value pairs bound to the script's default parameter set |
//!
//! `expression` and `file` are mutually exclusive, and so are
//! `arguments` and `auto_parameters`.
//!
//! # Diagnostic locations
//!
//! Messages of the form `file(line[,column]) : text` are located at that
//! position. Error objects fall back to the innermost stack-trace frame,
//! then to the invocation position.

mod error;
mod diagnostic;
mod command;
mod location;
mod output;
mod engine;
mod host;
mod runner;
mod process;

pub use error::{BridgeError, ErrorKind};
pub use diagnostic::{DiagnosticRecord, Severity, Sink, MemorySink, ConsoleSink};
pub use command::{
    CommandSpec, CommandBuilder, AutoParameter, FileSystem, StdFileSystem,
    ParameterNameProvider, bind_auto_parameters, SCRIPT_EXTENSION,
};
pub use location::{Frame, Location, Trailer, RawDiagnostic, resolve, resolve_message, MAX_POSITION};
pub use output::LineAggregator;
pub use engine::{
    ErrorObject, EngineFault, FormatRole, ResultObject, Stringifier, CallStack,
    ErrorSender, ResultStream, ScriptEngine, EngineSession, LineStringifier,
};
pub use host::{
    Host, HostAdapter, Interaction, NonInteractive, InteractionError, Credential,
    RunSummary, NON_INTERACTIVE_MESSAGE,
};
pub use runner::{Runner, RunnerBuilder, RunConfig, Phase, NoParameterProvider};
pub use process::{ProcessEngine, ProcessSession, ProcessParameterProvider, command_line, look_path, DEFAULT_INTERPRETER};
