//! Command construction
//!
//! Turns "run this expression" or "run this file with these arguments"
//! into one `CommandSpec` ready to hand to an engine session.

use std::path::Path;
use crate::error::BridgeError;

/// Default script file extension
pub const SCRIPT_EXTENSION: &str = ".ps1";

/// A fully resolved, ready-to-submit command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Script text, or the script path for direct invocations
    pub text: String,
    /// True when `text` is submitted as a script line
    pub is_script: bool,
    /// Named parameters for direct invocations, in declaration order
    pub bound_parameters: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn script(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_script: true,
            bound_parameters: Vec::new(),
        }
    }
}

/// A caller-supplied name/value pair for auto-parameter binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoParameter {
    pub name: String,
    pub value: String,
}

impl AutoParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// File-system probe used to validate script paths
pub trait FileSystem {
    fn exists(&self, path: &str) -> bool;

    fn full_path(&self, path: &str) -> Result<String, std::io::Error>;
}

/// Probe backed by the real file system
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn exists(&self, path: &str) -> bool {
        Path::new(path).is_file()
    }

    fn full_path(&self, path: &str) -> Result<String, std::io::Error> {
        Ok(std::path::absolute(path)?.to_string_lossy().to_string())
    }
}

/// Supplies the parameter names of a script's default parameter set.
pub trait ParameterNameProvider {
    /// Must fail when the script has no unambiguous default parameter set.
    fn default_parameter_names(&self, script_path: &str) -> Result<Vec<String>, BridgeError>;
}

/// Collects the run parameters and validates them into a `CommandSpec`.
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    expression: Option<String>,
    file: Option<String>,
    arguments: Option<String>,
    auto_parameters: Option<Vec<AutoParameter>>,
    extension: Option<String>,
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }

    /// An empty list still counts as "specified".
    pub fn auto_parameters(mut self, params: impl IntoIterator<Item = AutoParameter>) -> Self {
        self.auto_parameters = Some(params.into_iter().collect());
        self
    }

    /// Script extension, compared case-insensitively (default `.ps1`)
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Use `extension` unless one was set explicitly.
    pub fn default_extension(mut self, extension: impl Into<String>) -> Self {
        if self.extension.is_none() {
            self.extension = Some(extension.into());
        }
        self
    }

    fn script_extension(&self) -> &str {
        self.extension.as_deref().unwrap_or(SCRIPT_EXTENSION)
    }

    /// Validate the parameters and produce the command.
    ///
    /// Checks run in a fixed order and the first failure wins. The probe
    /// and the provider are only consulted for file invocations.
    pub fn build(
        &self,
        fs: &dyn FileSystem,
        params: &dyn ParameterNameProvider,
    ) -> Result<CommandSpec, BridgeError> {
        match (&self.expression, &self.file) {
            (Some(_), Some(_)) => Err(BridgeError::expression_and_file()),
            (Some(expression), None) => self.build_expression(expression),
            (None, Some(file)) => self.build_file(file, fs, params),
            (None, None) => Err(BridgeError::nothing_to_run()),
        }
    }

    fn build_expression(&self, expression: &str) -> Result<CommandSpec, BridgeError> {
        if self.arguments.is_some() {
            return Err(BridgeError::arguments_with_expression());
        }
        if self.auto_parameters.is_some() {
            return Err(BridgeError::auto_parameters_with_expression());
        }
        Ok(CommandSpec::script(expression))
    }

    fn build_file(
        &self,
        file: &str,
        fs: &dyn FileSystem,
        params: &dyn ParameterNameProvider,
    ) -> Result<CommandSpec, BridgeError> {
        if self.arguments.is_some() && self.auto_parameters.is_some() {
            return Err(BridgeError::arguments_and_auto_parameters());
        }
        let extension = self.script_extension();
        if !has_extension(file, extension) {
            return Err(BridgeError::not_a_script_file(file, extension));
        }

        let path = fs.full_path(file)?;
        if !fs.exists(&path) {
            return Err(BridgeError::script_file_not_found(file, extension));
        }

        match self.auto_parameters {
            Some(ref auto) => {
                let names = params.default_parameter_names(&path)?;
                Ok(CommandSpec {
                    bound_parameters: bind_auto_parameters(&names, auto),
                    text: path,
                    is_script: false,
                })
            }
            None => {
                let mut text = format!("& '{}'", path);
                if let Some(ref args) = self.arguments {
                    if !args.is_empty() {
                        text.push(' ');
                        text.push_str(args);
                    }
                }
                Ok(CommandSpec::script(text))
            }
        }
    }
}

/// Case-insensitive suffix check
fn has_extension(file: &str, extension: &str) -> bool {
    file.len() >= extension.len()
        && file.is_char_boundary(file.len() - extension.len())
        && file[file.len() - extension.len()..].eq_ignore_ascii_case(extension)
}

/// Map caller pairs onto declared parameter names.
///
/// Provider order is kept; for each name the last non-empty value of a
/// case-insensitively matching pair wins. Names with no value are skipped.
pub fn bind_auto_parameters(names: &[String], auto: &[AutoParameter]) -> Vec<(String, String)> {
    names
        .iter()
        .filter_map(|name| {
            auto.iter()
                .rev()
                .find(|p| !p.value.is_empty() && p.name.eq_ignore_ascii_case(name))
                .map(|p| (name.clone(), p.value.clone()))
        })
        .collect()
}
