//! Out-of-process engine
//!
//! Drives an external interpreter executable (`pwsh` by default) as the
//! script engine. Stdout lines are results, except lines carrying the
//! interpreter's `WARNING:`, `VERBOSE:` and `DEBUG:` stream prefixes,
//! which go straight to the host. Stderr lines become error objects on
//! the asynchronous error stream.
//!
//! Output is split on `\n` and decoded lossily, so console text in a
//! legacy code page still arrives (with replacement characters) instead
//! of ending the run. Stderr carries no record boundaries, so an error
//! that spans several lines is reported as one error record per
//! non-blank line and counts that many times in the run summary.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command as ProcessCommand, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use crate::command::{CommandSpec, ParameterNameProvider};
use crate::engine::{EngineFault, EngineSession, ErrorObject, ErrorSender, ResultStream, ScriptEngine};
use crate::error::{BridgeError, ErrorKind};
use crate::host::Host;

/// Default interpreter program
pub const DEFAULT_INTERPRETER: &str = "pwsh";

fn default_lead_args() -> Vec<String> {
    ["-NoLogo", "-NoProfile", "-NonInteractive", "-Command"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Engine backed by an interpreter child process
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: String,
    lead_args: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self::new(DEFAULT_INTERPRETER)
    }
}

impl ProcessEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            lead_args: default_lead_args(),
            current_dir: None,
        }
    }

    /// Arguments placed before the command text
    pub fn lead_args(mut self, args: Vec<String>) -> Self {
        self.lead_args = args;
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

impl ScriptEngine for ProcessEngine {
    type Value = String;
    type Session = ProcessSession;

    fn open(
        &self,
        host: Arc<dyn Host>,
        errors: ErrorSender,
        env: &[(String, String)],
    ) -> Result<ProcessSession, BridgeError> {
        let path_env = env
            .iter()
            .find(|(k, _)| k == "PATH")
            .map(|(_, v)| v.clone())
            .or_else(|| std::env::var("PATH").ok())
            .unwrap_or_default();
        let program = look_path(&self.program, &path_env).map_err(|e| {
            BridgeError::new(ErrorKind::SessionOpen, format!("failed to start '{}': {}", self.program, e))
        })?;
        tracing::debug!(program = %program.display(), "resolved interpreter");

        Ok(ProcessSession {
            program,
            lead_args: self.lead_args.clone(),
            current_dir: self.current_dir.clone(),
            env: env.to_vec(),
            host,
            errors: Some(errors),
            child: None,
            stderr_reader: None,
        })
    }
}

/// One interpreter invocation
pub struct ProcessSession {
    program: PathBuf,
    lead_args: Vec<String>,
    current_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    host: Arc<dyn Host>,
    errors: Option<ErrorSender>,
    child: Option<Child>,
    stderr_reader: Option<JoinHandle<()>>,
}

impl EngineSession for ProcessSession {
    type Value = String;

    fn submit(&mut self, command: &CommandSpec) -> Result<ResultStream<'_, String>, EngineFault> {
        let mut cmd = ProcessCommand::new(&self.program);
        cmd.args(&self.lead_args);
        cmd.arg(command_line(command));
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            EngineFault::Host(format!("failed to execute '{}': {}", self.program.display(), e))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineFault::Host("interpreter stdout was not captured".into()))?;
        if let (Some(stderr), Some(errors)) = (child.stderr.take(), self.errors.take()) {
            self.stderr_reader = Some(std::thread::spawn(move || forward_stderr(stderr, errors)));
        }
        self.child = Some(child);

        Ok(Box::new(StdoutResults {
            reader: BufReader::new(stdout),
            buf: Vec::new(),
            host: self.host.clone(),
        }))
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.wait() {
                Ok(status) => tracing::debug!(%status, "interpreter exited"),
                Err(e) => tracing::warn!(error = %e, "failed to wait for interpreter"),
            }
        }
        if let Some(reader) = self.stderr_reader.take() {
            join_stderr_reader(reader);
        }
    }
}

/// Returns false when the reader panicked.
fn join_stderr_reader(reader: JoinHandle<()>) -> bool {
    let joined = reader.join().is_ok();
    if !joined {
        tracing::warn!("stderr reader panicked; later interpreter errors may be missing");
    }
    joined
}

/// Read one line without its terminator, replacing invalid UTF-8.
/// Returns `None` at end of stream.
fn read_line_lossy(reader: &mut impl BufRead, buf: &mut Vec<u8>) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Every non-blank stderr line is one error object.
fn forward_stderr(stderr: impl Read, errors: ErrorSender) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        let line = match read_line_lossy(&mut reader, &mut buf) {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read interpreter stderr");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        if errors.send(ErrorObject::new(line)).is_err() {
            break;
        }
    }
}

struct StdoutResults<R> {
    reader: R,
    buf: Vec<u8>,
    host: Arc<dyn Host>,
}

impl<R: BufRead> Iterator for StdoutResults<R> {
    type Item = Result<String, EngineFault>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match read_line_lossy(&mut self.reader, &mut self.buf) {
                Ok(line) => line?,
                Err(e) => return Some(Err(EngineFault::Host(format!("reading interpreter output: {}", e)))),
            };
            if let Some(msg) = line.strip_prefix("WARNING: ") {
                self.host.write_warning_line(msg);
            } else if let Some(msg) = line.strip_prefix("VERBOSE: ") {
                self.host.write_verbose(msg);
            } else if let Some(msg) = line.strip_prefix("DEBUG: ") {
                self.host.write_debug(msg);
            } else {
                return Some(Ok(line));
            }
        }
    }
}

/// The interpreter command line for a command
pub fn command_line(command: &CommandSpec) -> String {
    if command.is_script {
        return command.text.clone();
    }
    let mut line = format!("& {}", quote(&command.text));
    for (name, value) in &command.bound_parameters {
        line.push_str(&format!(" -{} {}", name, quote(value)));
    }
    line
}

/// Single-quoted literal with embedded quotes doubled
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Asks the interpreter for a script's default parameter set.
#[derive(Debug, Clone)]
pub struct ProcessParameterProvider {
    program: String,
    lead_args: Vec<String>,
}

impl Default for ProcessParameterProvider {
    fn default() -> Self {
        Self::new(DEFAULT_INTERPRETER)
    }
}

impl ProcessParameterProvider {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            lead_args: default_lead_args(),
        }
    }

    /// Arguments placed before the query text
    pub fn lead_args(mut self, args: Vec<String>) -> Self {
        self.lead_args = args;
        self
    }
}

impl ParameterNameProvider for ProcessParameterProvider {
    fn default_parameter_names(&self, script_path: &str) -> Result<Vec<String>, BridgeError> {
        let query = format!(
            "$c = Get-Command -Name {}; \
             $s = if ($c.ParameterSets.Count -eq 1) {{ $c.ParameterSets[0] }} \
             else {{ $c.ParameterSets | Where-Object {{ $_.IsDefault }} | Select-Object -First 1 }}; \
             if (-not $s) {{ exit 3 }}; \
             $s.Parameters | ForEach-Object {{ $_.Name }}",
            quote(script_path)
        );
        let path_env = std::env::var("PATH").unwrap_or_default();
        let program = look_path(&self.program, &path_env)
            .map_err(|e| BridgeError::parameter_set(script_path, e))?;

        let output = ProcessCommand::new(&program)
            .args(&self.lead_args)
            .arg(query)
            .stdin(Stdio::null())
            .output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = match output.status.code() {
                Some(3) => "no unambiguous default parameter set".to_string(),
                _ => stderr.trim().to_string(),
            };
            return Err(BridgeError::parameter_set(script_path, reason));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Look up an executable by name using the given PATH value.
///
/// Names containing a path separator are used as-is.
pub fn look_path(command: &str, path_env: &str) -> Result<PathBuf, String> {
    if command.contains(std::path::MAIN_SEPARATOR) || command.contains('/') {
        return Ok(PathBuf::from(command));
    }

    #[cfg(windows)]
    let extensions: Vec<String> = std::env::var("PATHEXT")
        .unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string())
        .split(';')
        .map(|s| s.to_lowercase())
        .collect();

    for dir in std::env::split_paths(path_env) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(command);

        #[cfg(windows)]
        {
            if candidate.is_file() {
                return Ok(candidate);
            }
            for ext in &extensions {
                let with_ext = dir.join(format!("{}{}", command, ext));
                if with_ext.is_file() {
                    return Ok(with_ext);
                }
            }
        }

        #[cfg(not(windows))]
        {
            if is_executable(&candidate) {
                return Ok(candidate);
            }
        }
    }

    Err(format!("executable not found: {}", command))
}

#[cfg(not(windows))]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
