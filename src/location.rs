//! Diagnostic location resolution
//!
//! The engine only hands us free-form text and an unreliable call-stack
//! string. Resolution runs an ordered chain of pure matchers and keeps
//! the first hit:
//!
//! 1. a `file(line[,col]) : message` prefix in the message itself
//! 2. the first `..., file: line N` frame in the stack trace
//! 3. the engine's current frame
//! 4. no location at all

use std::sync::LazyLock;
use regex::Regex;

/// Line and column numbers above this are clamped.
pub const MAX_POSITION: u32 = i32::MAX as u32;

/// `file(line)` or `file(line,col)` followed by ` : `. The file part is the
/// shortest run before the first such group; the rest may span lines.
static STRUCTURED_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<file>[^\r\n]+?)\((?P<line>[0-9]+)(?:,(?P<column>[0-9]+))?\) : (?P<rest>(?s:.*))")
        .expect("constant regex pattern is valid")
});

/// One stack frame line ending in `, file: line N`.
static STACK_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^.*, (?P<file>.+): line (?P<line>[0-9]+)\r?$")
        .expect("constant regex pattern is valid")
});

/// A call-stack frame reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub script_path: Option<String>,
    pub line: u32,
}

impl Frame {
    pub fn new(script_path: impl Into<String>, line: u32) -> Self {
        Self {
            script_path: Some(script_path.into()),
            line,
        }
    }
}

/// Message and location produced by the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub message: String,
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl Location {
    fn unknown(message: &str) -> Self {
        Self {
            message: message.to_string(),
            file: None,
            line: 0,
            column: 0,
        }
    }
}

/// Whether a structured-prefix match appends an `at file: line N` trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trailer {
    /// Errors: annotate and append the stack trace
    Annotate,
    /// Warnings and error lines: bare message
    Bare,
}

/// Inputs of one resolution
#[derive(Debug, Clone, Copy)]
pub struct RawDiagnostic<'a> {
    pub message: &'a str,
    pub stack_trace: Option<&'a str>,
    pub frame: Option<&'a Frame>,
}

type Matcher = fn(&RawDiagnostic<'_>, Trailer) -> Option<Location>;

const ERROR_CHAIN: &[Matcher] = &[from_structured_prefix, from_stack_trace, from_current_frame];

const MESSAGE_CHAIN: &[Matcher] = &[from_structured_prefix, from_current_frame];

/// Full resolution for error objects, trailer enabled.
pub fn resolve(message: &str, stack_trace: Option<&str>, frame: Option<&Frame>) -> Location {
    let raw = RawDiagnostic {
        message,
        stack_trace,
        frame,
    };
    run_chain(ERROR_CHAIN, &raw, Trailer::Annotate)
}

/// Resolution for bare message lines (warnings, error lines): no stack
/// trace is consulted and no trailer is added.
pub fn resolve_message(message: &str, frame: Option<&Frame>) -> Location {
    let raw = RawDiagnostic {
        message,
        stack_trace: None,
        frame,
    };
    run_chain(MESSAGE_CHAIN, &raw, Trailer::Bare)
}

fn run_chain(chain: &[Matcher], raw: &RawDiagnostic<'_>, trailer: Trailer) -> Location {
    chain
        .iter()
        .find_map(|matcher| matcher(raw, trailer))
        .unwrap_or_else(|| Location::unknown(raw.message))
}

fn from_structured_prefix(raw: &RawDiagnostic<'_>, trailer: Trailer) -> Option<Location> {
    let caps = STRUCTURED_PREFIX.captures(raw.message)?;
    let file = caps["file"].to_string();
    let line = parse_position(&caps["line"]);
    let column = caps.name("column").map_or(0, |m| parse_position(m.as_str()));

    let mut message = caps["rest"].to_string();
    if trailer == Trailer::Annotate {
        message.push_str(&format!("\nat {}: line {}", file, line));
        if let Some(stack) = raw.stack_trace {
            message.push('\n');
            message.push_str(stack);
        }
    }

    Some(Location {
        message,
        file: Some(file),
        line,
        column,
    })
}

fn from_stack_trace(raw: &RawDiagnostic<'_>, _trailer: Trailer) -> Option<Location> {
    let stack = raw.stack_trace?;
    let caps = STACK_FRAME.captures(stack)?;
    Some(Location {
        message: format!("{}\n{}", raw.message, stack),
        file: Some(caps["file"].to_string()),
        line: parse_position(&caps["line"]),
        column: 0,
    })
}

fn from_current_frame(raw: &RawDiagnostic<'_>, _trailer: Trailer) -> Option<Location> {
    let frame = raw.frame?;
    let file = frame.script_path.as_deref().filter(|p| !p.is_empty());
    Some(Location {
        message: raw.message.to_string(),
        file: file.map(str::to_string),
        line: if file.is_some() { frame.line } else { 0 },
        column: 0,
    })
}

/// Digits only by construction; anything too large clamps.
fn parse_position(digits: &str) -> u32 {
    digits.parse::<u32>().map_or(MAX_POSITION, |n| n.min(MAX_POSITION))
}
