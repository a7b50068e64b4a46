//! Execution orchestrator
//!
//! Builds the command, opens one engine session with a `HostAdapter`
//! installed, drains results and the asynchronous error stream, and maps
//! engine faults to either a final diagnostic or a fatal error.
//!
//! ```text
//! Idle -> CommandBuilt -> SessionOpen -> Draining -> Closed
//! ```
//!
//! `Closed` is reachable from every state, and the partial output line is
//! flushed exactly once on the way in.

use std::sync::mpsc;
use std::sync::Arc;
use crate::command::{CommandBuilder, CommandSpec, FileSystem, ParameterNameProvider, StdFileSystem, SCRIPT_EXTENSION};
use crate::diagnostic::Sink;
use crate::engine::{EngineFault, EngineSession, ResultObject, ScriptEngine, Stringifier};
use crate::error::BridgeError;
use crate::host::{Host, HostAdapter, RunSummary};

/// Configuration for the runner
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Script file extension for commands that do not set their own
    pub script_extension: String,
    /// Environment the engine session must see
    pub session_env: Vec<(String, String)>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            script_extension: SCRIPT_EXTENSION.into(),
            session_env: vec![("PSExecutionPolicyPreference".into(), "Bypass".into())],
        }
    }
}

/// Orchestrator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CommandBuilt,
    SessionOpen,
    Draining,
    Closed,
}

/// Provider used when none is configured; auto-parameters always fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoParameterProvider;

impl ParameterNameProvider for NoParameterProvider {
    fn default_parameter_names(&self, script_path: &str) -> Result<Vec<String>, BridgeError> {
        Err(BridgeError::parameter_set(script_path, "no parameter provider configured"))
    }
}

/// Flushes the host on every exit path, including unwinding.
struct EndSession<'a, V: ResultObject>(&'a HostAdapter<V>);

impl<V: ResultObject> Drop for EndSession<'_, V> {
    fn drop(&mut self) {
        self.0.end_session();
    }
}

/// Runs commands against one kind of engine
pub struct Runner<E: ScriptEngine> {
    engine: E,
    stringifier: Box<dyn Stringifier<E::Value>>,
    fs: Box<dyn FileSystem>,
    params: Box<dyn ParameterNameProvider>,
    config: RunConfig,
}

impl<E: ScriptEngine> Runner<E> {
    pub fn new(engine: E, stringifier: Box<dyn Stringifier<E::Value>>, config: RunConfig) -> Self {
        Self {
            engine,
            stringifier,
            fs: Box::new(StdFileSystem),
            params: Box::new(NoParameterProvider),
            config,
        }
    }

    pub fn builder(engine: E, stringifier: Box<dyn Stringifier<E::Value>>) -> RunnerBuilder<E> {
        RunnerBuilder::new(engine, stringifier)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Build the command and run it, reporting everything to `sink`.
    ///
    /// Configuration errors and host faults are returned; script-level
    /// failures, including an uncaught script fault, become records and the
    /// run still returns `Ok`.
    pub fn run(&self, command: CommandBuilder, sink: Arc<dyn Sink>) -> Result<RunSummary, BridgeError> {
        let mut phase = Phase::Idle;
        let spec = command
            .default_extension(self.config.script_extension.clone())
            .build(self.fs.as_ref(), self.params.as_ref());
        let spec = match spec {
            Ok(spec) => spec,
            Err(e) => {
                advance(&mut phase, Phase::Closed);
                return Err(e);
            }
        };
        advance(&mut phase, Phase::CommandBuilt);

        let host = Arc::new(
            HostAdapter::<E::Value>::new(sink).with_call_stack(self.engine.call_stack()),
        );
        let end_session = EndSession(host.as_ref());

        let (errors_tx, errors_rx) = mpsc::channel();
        let session = match self.engine.open(host.clone() as Arc<dyn Host>, errors_tx, &self.config.session_env) {
            Ok(session) => session,
            Err(e) => {
                advance(&mut phase, Phase::Closed);
                return Err(e);
            }
        };
        advance(&mut phase, Phase::SessionOpen);

        let fault = std::thread::scope(|scope| {
            let forwarder = scope.spawn(|| {
                for error in errors_rx {
                    host.write_error(&error);
                }
            });

            advance(&mut phase, Phase::Draining);
            let fault = self.drain(session, &spec, &host);

            if forwarder.join().is_err() {
                tracing::warn!("error stream forwarder panicked");
            }
            fault
        });

        let result = match fault {
            None => Ok(()),
            Some(EngineFault::Script(error)) => {
                host.write_error(&error);
                Ok(())
            }
            Some(EngineFault::Host(msg)) => Err(BridgeError::host_fault(msg)),
        };

        drop(end_session);
        advance(&mut phase, Phase::Closed);

        let summary = host.summary();
        tracing::info!(
            warnings = summary.warnings,
            errors = summary.errors,
            "script run finished"
        );
        result.map(|()| summary)
    }

    /// Submit the command and hand every result to the host. Consumes the
    /// session so the error stream closes once draining is done.
    fn drain(&self, mut session: E::Session, spec: &CommandSpec, host: &HostAdapter<E::Value>) -> Option<EngineFault> {
        let results = match session.submit(spec) {
            Ok(results) => results,
            Err(fault) => return Some(fault),
        };
        for item in results {
            match item {
                Ok(value) => host.write_result(value, self.stringifier.as_ref()),
                Err(fault) => return Some(fault),
            }
        }
        None
    }
}

fn advance(phase: &mut Phase, next: Phase) {
    tracing::debug!(from = ?*phase, to = ?next, "runner phase");
    *phase = next;
}

/// Builder API for runner construction
pub struct RunnerBuilder<E: ScriptEngine> {
    engine: E,
    stringifier: Box<dyn Stringifier<E::Value>>,
    fs: Option<Box<dyn FileSystem>>,
    params: Option<Box<dyn ParameterNameProvider>>,
    config: RunConfig,
}

impl<E: ScriptEngine> RunnerBuilder<E> {
    pub fn new(engine: E, stringifier: Box<dyn Stringifier<E::Value>>) -> Self {
        Self {
            engine,
            stringifier,
            fs: None,
            params: None,
            config: RunConfig::default(),
        }
    }

    /// Use a custom file-system probe
    pub fn file_system(mut self, fs: Box<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Use a parameter-name provider for auto-parameter binding
    pub fn parameter_provider(mut self, params: Box<dyn ParameterNameProvider>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn script_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.script_extension = ext.into();
        self
    }

    /// Add or replace one session environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.config.session_env.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.config.session_env.push((key, value)),
        }
        self
    }

    pub fn build(self) -> Runner<E> {
        let mut runner = Runner::new(self.engine, self.stringifier, self.config);
        if let Some(fs) = self.fs {
            runner.fs = fs;
        }
        if let Some(params) = self.params {
            runner.params = params;
        }
        runner
    }
}
