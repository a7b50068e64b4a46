//! Bridge errors

use std::fmt;

/// The kind of bridge error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Both an expression and a file were given
    ExpressionAndFile,
    /// Arguments were given together with an expression
    ArgumentsWithExpression,
    /// Auto-parameters were given together with an expression
    AutoParametersWithExpression,
    /// Arguments and auto-parameters were both given for a file
    ArgumentsAndAutoParameters,
    /// The file does not carry the script extension
    NotAScriptFile,
    /// The script file does not exist
    ScriptFileNotFound,
    /// Neither an expression nor a file was given
    NothingToRun,
    /// The script has no unambiguous default parameter set
    ParameterSet,
    /// The engine session could not be opened
    SessionOpen,
    /// The engine faulted without an error object
    HostFault,
    /// IO error
    Io,
}

/// An error raised by the bridge itself (never by the script it runs)
#[derive(Debug, Clone)]
pub struct BridgeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BridgeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn expression_and_file() -> Self {
        Self::new(
            ErrorKind::ExpressionAndFile,
            "You cannot specify both the Expression and File parameters simultaneously.",
        )
    }

    pub fn arguments_with_expression() -> Self {
        Self::new(
            ErrorKind::ArgumentsWithExpression,
            "The Arguments parameter can only be specified with the File parameter.",
        )
    }

    pub fn auto_parameters_with_expression() -> Self {
        Self::new(
            ErrorKind::AutoParametersWithExpression,
            "The AutoParameters parameter can only be specified with the File parameter.",
        )
    }

    pub fn arguments_and_auto_parameters() -> Self {
        Self::new(
            ErrorKind::ArgumentsAndAutoParameters,
            "You cannot specify both the Arguments and AutoParameters parameters simultaneously.",
        )
    }

    pub fn not_a_script_file(file: &str, extension: &str) -> Self {
        Self::new(
            ErrorKind::NotAScriptFile,
            format!(
                "Processing File '{}' failed because the file does not have a '{}' extension. \
                 Specify a valid script file name, and then try again.",
                file, extension
            ),
        )
    }

    pub fn script_file_not_found(file: &str, extension: &str) -> Self {
        Self::new(
            ErrorKind::ScriptFileNotFound,
            format!(
                "The argument '{}' to the File parameter does not exist. \
                 Provide the path to an existing '{}' file as an argument to the File parameter.",
                file, extension
            ),
        )
    }

    pub fn nothing_to_run() -> Self {
        Self::new(
            ErrorKind::NothingToRun,
            "Either the Expression or File parameter must be specified.",
        )
    }

    pub fn parameter_set(script: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::ParameterSet,
            format!("{} does not have a default parameter set: {}", script, reason),
        )
    }

    pub fn host_fault(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::HostFault, msg)
    }

    /// Whether the caller supplied contradictory, missing or invalid inputs.
    /// These are reported before any engine session is opened.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ExpressionAndFile
                | ErrorKind::ArgumentsWithExpression
                | ErrorKind::AutoParametersWithExpression
                | ErrorKind::ArgumentsAndAutoParameters
                | ErrorKind::NotAScriptFile
                | ErrorKind::ScriptFileNotFound
                | ErrorKind::NothingToRun
                | ErrorKind::ParameterSet
        )
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BridgeError {}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, e.to_string())
    }
}
