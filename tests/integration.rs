//! Integration test: drive the runner against a scripted engine
//!
//! `ScriptedEngine` replays a fixed list of host calls, error events,
//! result values and faults, so whole runs can be checked without an
//! interpreter installed.
//!
//! Usage:
//!   cargo test --package emx-scriptbridge --test integration

use std::sync::Arc;
use parking_lot::Mutex;
use similar::TextDiff;
use emx_scriptbridge::{
    AutoParameter, BridgeError, CallStack, CommandBuilder, CommandSpec, DiagnosticRecord,
    EngineFault, EngineSession, ErrorKind, ErrorObject, ErrorSender, FormatRole, Frame, Host,
    MemorySink, ParameterNameProvider, ResultObject, ResultStream, Runner, ScriptEngine, Severity,
    StdFileSystem, Stringifier, NON_INTERACTIVE_MESSAGE,
};

#[derive(Debug, Clone)]
enum Item {
    Text(&'static str),
    Row(&'static str),
    EndTable,
}

impl ResultObject for Item {
    fn format_role(&self) -> FormatRole {
        match self {
            Item::Text(_) => FormatRole::Plain,
            Item::Row(_) => FormatRole::Part,
            Item::EndTable => FormatRole::End,
        }
    }
}

struct ItemStringifier;

impl Stringifier<Item> for ItemStringifier {
    fn render(&self, value: &Item) -> String {
        match value {
            Item::Text(s) | Item::Row(s) => format!("{}\n", s),
            Item::EndTable => String::new(),
        }
    }

    fn render_run(&self, run: &[Item]) -> String {
        run.iter().map(|v| self.render(v)).collect()
    }
}

#[derive(Debug, Clone)]
enum Step {
    Text(&'static str),
    Debug(&'static str),
    Warning(&'static str),
    ErrorLine(&'static str),
    ErrorEvent(ErrorObject),
    Value(Item),
    ReadLine,
    Fault(EngineFault),
}

struct FixedFrame(Frame);

impl CallStack for FixedFrame {
    fn current_frame(&self) -> Option<Frame> {
        Some(self.0.clone())
    }
}

#[derive(Default)]
struct Recorded {
    opened: usize,
    env: Vec<(String, String)>,
    submitted: Vec<CommandSpec>,
}

#[derive(Default)]
struct ScriptedEngine {
    steps: Vec<Step>,
    frame: Option<Frame>,
    fail_open: bool,
    recorded: Arc<Mutex<Recorded>>,
}

impl ScriptedEngine {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    fn with_frame(mut self, file: &str, line: u32) -> Self {
        self.frame = Some(Frame::new(file, line));
        self
    }
}

impl ScriptEngine for ScriptedEngine {
    type Value = Item;
    type Session = ScriptedSession;

    fn open(
        &self,
        host: Arc<dyn Host>,
        errors: ErrorSender,
        env: &[(String, String)],
    ) -> Result<ScriptedSession, BridgeError> {
        if self.fail_open {
            return Err(BridgeError::new(ErrorKind::SessionOpen, "engine unavailable"));
        }
        let mut recorded = self.recorded.lock();
        recorded.opened += 1;
        recorded.env = env.to_vec();
        Ok(ScriptedSession {
            steps: self.steps.clone(),
            host,
            errors,
            recorded: self.recorded.clone(),
        })
    }

    fn call_stack(&self) -> Option<Arc<dyn CallStack>> {
        self.frame
            .clone()
            .map(|f| Arc::new(FixedFrame(f)) as Arc<dyn CallStack>)
    }
}

struct ScriptedSession {
    steps: Vec<Step>,
    host: Arc<dyn Host>,
    errors: ErrorSender,
    recorded: Arc<Mutex<Recorded>>,
}

impl EngineSession for ScriptedSession {
    type Value = Item;

    fn submit(&mut self, command: &CommandSpec) -> Result<ResultStream<'_, Item>, EngineFault> {
        self.recorded.lock().submitted.push(command.clone());
        Ok(Box::new(Replay {
            steps: std::mem::take(&mut self.steps).into_iter(),
            host: self.host.clone(),
            errors: &self.errors,
        }))
    }
}

struct Replay<'a> {
    steps: std::vec::IntoIter<Step>,
    host: Arc<dyn Host>,
    errors: &'a ErrorSender,
}

impl Iterator for Replay<'_> {
    type Item = Result<Item, EngineFault>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.steps.next()? {
                Step::Text(s) => self.host.write_text(s),
                Step::Debug(s) => self.host.write_debug(s),
                Step::Warning(s) => self.host.write_warning_line(s),
                Step::ErrorLine(s) => self.host.write_error_line(s),
                Step::ErrorEvent(e) => {
                    let _ = self.errors.send(e);
                }
                Step::ReadLine => {
                    let _ = self.host.read_line();
                }
                Step::Value(v) => return Some(Ok(v)),
                Step::Fault(f) => return Some(Err(f)),
            }
        }
    }
}

struct FixedParams(Vec<&'static str>);

impl ParameterNameProvider for FixedParams {
    fn default_parameter_names(&self, _script_path: &str) -> Result<Vec<String>, BridgeError> {
        Ok(self.0.iter().map(|s| s.to_string()).collect())
    }
}

struct NoDefaultSet;

impl ParameterNameProvider for NoDefaultSet {
    fn default_parameter_names(&self, script_path: &str) -> Result<Vec<String>, BridgeError> {
        Err(BridgeError::parameter_set(script_path, "no unambiguous default parameter set"))
    }
}

fn runner(engine: ScriptedEngine) -> Runner<ScriptedEngine> {
    Runner::builder(engine, Box::new(ItemStringifier)).build()
}

/// Compare rendered records, printing a line diff on mismatch.
fn assert_log(sink: &MemorySink, expected: &[&str]) {
    let render = |lines: Vec<String>| lines.iter().map(|l| format!("{}\n", l)).collect::<String>();
    let actual = render(sink.records().iter().map(DiagnosticRecord::to_string).collect());
    let expected = render(expected.iter().map(|s| s.to_string()).collect());
    if actual != expected {
        let diff = TextDiff::from_lines(&expected, &actual);
        panic!(
            "diagnostics differ:\n{}",
            diff.unified_diff().header("expected", "actual")
        );
    }
}

#[test]
fn test_write_warning_with_structured_prefix() {
    let engine = ScriptedEngine::new(vec![Step::Warning(r"c:\f.txt(123) : test")]);
    let recorded = engine.recorded.clone();
    let sink = MemorySink::new();

    let summary = runner(engine)
        .run(
            CommandBuilder::new().expression(r"Write-Warning 'c:\f.txt(123) : test'"),
            Arc::new(sink.clone()),
        )
        .unwrap();

    assert_eq!(
        sink.records(),
        vec![DiagnosticRecord::new(Severity::Warning, "test").at(Some(r"c:\f.txt".into()), 123, 0)]
    );
    assert_eq!(summary.warnings, 1);
    assert!(summary.succeeded());

    let submitted = &recorded.lock().submitted;
    assert_eq!(submitted.len(), 1);
    assert!(submitted[0].is_script);
    assert_eq!(submitted[0].text, r"Write-Warning 'c:\f.txt(123) : test'");
}

#[test]
fn test_configuration_error_never_opens_session() {
    let engine = ScriptedEngine::new(vec![Step::Text("never\n")]);
    let recorded = engine.recorded.clone();
    let sink = MemorySink::new();

    let err = runner(engine)
        .run(
            CommandBuilder::new().expression("1").file("a.ps1").arguments("x"),
            Arc::new(sink.clone()),
        )
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::ExpressionAndFile);
    assert!(err.is_configuration());
    assert!(sink.records().is_empty());
    assert_eq!(recorded.lock().opened, 0);
}

#[test]
fn test_nothing_to_run() {
    let sink = MemorySink::new();
    let err = runner(ScriptedEngine::default())
        .run(CommandBuilder::new(), Arc::new(sink.clone()))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NothingToRun);
    assert!(sink.records().is_empty());
}

#[test]
fn test_output_lines_and_partial_tail() {
    let engine = ScriptedEngine::new(vec![
        Step::Text("Hello, "),
        Step::Text("world"),
        Step::Text("\n"),
        Step::Debug("dbg"),
        Step::Value(Item::Text("value")),
        Step::Text("no newline"),
    ]);
    let sink = MemorySink::new();

    let summary = runner(engine)
        .run(CommandBuilder::new().expression("x"), Arc::new(sink.clone()))
        .unwrap();

    assert_log(&sink, &["Hello, world", "dbg", "value", "no newline"]);
    assert_eq!(sink.records()[1].severity, Severity::LowPriorityInfo);
    assert_eq!(summary.infos, 3);
    assert_eq!(summary.low_priority, 1);
}

#[test]
fn test_formatting_run_rendered_as_one_record() {
    let engine = ScriptedEngine::new(vec![
        Step::Value(Item::Text("before")),
        Step::Value(Item::Row("Name Value")),
        Step::Value(Item::Row("---- -----")),
        Step::Value(Item::Row("foo  bar")),
        Step::Value(Item::EndTable),
        Step::Value(Item::Text("after")),
    ]);
    let sink = MemorySink::new();

    runner(engine)
        .run(CommandBuilder::new().expression("Get-Thing | Format-Table"), Arc::new(sink.clone()))
        .unwrap();

    let messages: Vec<String> = sink.records().into_iter().map(|r| r.message).collect();
    assert_eq!(messages, vec!["before", "Name Value\n---- -----\nfoo  bar", "after"]);
}

#[test]
fn test_uncaught_script_fault_is_final_error() {
    let fault = ErrorObject::new("Something failed")
        .with_stack_trace("at Invoke-Build, C:\\s.ps1: line 7\nat <ScriptBlock>, <No file>: line 1");
    let engine = ScriptedEngine::new(vec![
        Step::Text("starting\n"),
        Step::ErrorEvent(ErrorObject::new("non-terminating")),
        Step::Fault(EngineFault::Script(fault)),
        Step::Text("unreachable\n"),
    ]);
    let sink = MemorySink::new();

    let summary = runner(engine)
        .run(CommandBuilder::new().expression("throw"), Arc::new(sink.clone()))
        .unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 3);
    assert!(records.iter().any(|r| r.message == "non-terminating"));
    let last = records.last().unwrap();
    assert_eq!(last.severity, Severity::Error);
    assert_eq!(last.file.as_deref(), Some(r"C:\s.ps1"));
    assert_eq!((last.line, last.column), (7, 0));
    assert!(last.message.starts_with("Something failed\n"));
    assert_eq!(summary.errors, 2);
    assert!(!summary.succeeded());
}

#[test]
fn test_host_fault_is_fatal_but_flushes_output() {
    let engine = ScriptedEngine::new(vec![
        Step::Text("partial"),
        Step::Fault(EngineFault::Host("pipeline stopped".into())),
    ]);
    let sink = MemorySink::new();

    let err = runner(engine)
        .run(CommandBuilder::new().expression("x"), Arc::new(sink.clone()))
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::HostFault);
    assert_eq!(err.message, "pipeline stopped");
    assert_eq!(sink.records(), vec![DiagnosticRecord::new(Severity::Info, "partial")]);
}

#[test]
fn test_session_open_failure_is_fatal() {
    let engine = ScriptedEngine {
        fail_open: true,
        ..Default::default()
    };
    let sink = MemorySink::new();
    let err = runner(engine)
        .run(CommandBuilder::new().expression("x"), Arc::new(sink.clone()))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::SessionOpen);
    assert!(!err.is_configuration());
    assert!(sink.records().is_empty());
}

#[test]
fn test_error_events_are_forwarded_in_order() {
    let mut steps = Vec::new();
    for i in 0..20 {
        steps.push(Step::ErrorEvent(ErrorObject::new(format!("e{}", i))));
        steps.push(Step::Value(Item::Text("v")));
    }
    let sink = MemorySink::new();

    let summary = runner(ScriptedEngine::new(steps))
        .run(CommandBuilder::new().expression("x"), Arc::new(sink.clone()))
        .unwrap();

    let errors: Vec<String> = sink
        .records()
        .into_iter()
        .filter(|r| r.severity == Severity::Error)
        .map(|r| r.message)
        .collect();
    let expected: Vec<String> = (0..20).map(|i| format!("e{}", i)).collect();
    assert_eq!(errors, expected);
    assert_eq!(summary.errors, 20);
    assert_eq!(summary.infos, 20);
}

#[test]
fn test_error_line_and_event_locations() {
    let engine = ScriptedEngine::new(vec![
        Step::ErrorLine("plain failure"),
        Step::ErrorEvent(
            ErrorObject::new(r"c:\foo\bar.txt(123,456) : This is a test")
                .with_stack_trace("at <ScriptBlock>, <No file>: line 1"),
        ),
    ])
    .with_frame("build.ps1", 4);
    let sink = MemorySink::new();

    runner(engine)
        .run(CommandBuilder::new().expression("x"), Arc::new(sink.clone()))
        .unwrap();

    assert_log(
        &sink,
        &[
            "build.ps1(4): error : plain failure",
            "c:\\foo\\bar.txt(123,456): error : This is a test\nat c:\\foo\\bar.txt: line 123\nat <ScriptBlock>, <No file>: line 1",
        ],
    );
}

#[test]
fn test_interactive_request_reports_error_and_run_continues() {
    let engine = ScriptedEngine::new(vec![Step::ReadLine, Step::Text("after\n")])
        .with_frame("<No file>", 1);
    let sink = MemorySink::new();

    let summary = runner(engine)
        .run(CommandBuilder::new().expression("Read-Host"), Arc::new(sink.clone()))
        .unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].severity, Severity::Error);
    assert_eq!(records[0].message, NON_INTERACTIVE_MESSAGE);
    assert_eq!(records[0].file.as_deref(), Some("<No file>"));
    assert_eq!(records[1].message, "after");
    assert!(!summary.succeeded());
}

#[test]
fn test_auto_parameters_bound_through_runner() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("build.ps1");
    std::fs::write(&script, "param($Arg1, $Arg2)\n").unwrap();
    let script = script.to_string_lossy().to_string();

    let engine = ScriptedEngine::default();
    let recorded = engine.recorded.clone();
    let runner = Runner::builder(engine, Box::new(ItemStringifier))
        .file_system(Box::new(StdFileSystem))
        .parameter_provider(Box::new(FixedParams(vec!["Arg1", "Arg2"])))
        .build();

    runner
        .run(
            CommandBuilder::new().file(script.clone()).auto_parameters([
                AutoParameter::new("Arg1", "foo"),
                AutoParameter::new("Arg2", "bar"),
                AutoParameter::new("Arg1", "baz"),
            ]),
            Arc::new(MemorySink::new()),
        )
        .unwrap();

    let submitted = &recorded.lock().submitted;
    assert_eq!(
        submitted[0],
        CommandSpec {
            text: script,
            is_script: false,
            bound_parameters: vec![("Arg1".into(), "baz".into()), ("Arg2".into(), "bar".into())],
        }
    );
}

#[test]
fn test_file_with_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("Run.PS1");
    std::fs::write(&script, "").unwrap();
    let script = script.to_string_lossy().to_string();

    let engine = ScriptedEngine::default();
    let recorded = engine.recorded.clone();
    runner(engine)
        .run(
            CommandBuilder::new().file(script.clone()).arguments("-Verbose 1"),
            Arc::new(MemorySink::new()),
        )
        .unwrap();

    let submitted = &recorded.lock().submitted;
    assert!(submitted[0].is_script);
    assert_eq!(submitted[0].text, format!("& '{}' -Verbose 1", script));
}

#[test]
fn test_missing_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone.ps1").to_string_lossy().to_string();
    let err = runner(ScriptedEngine::default())
        .run(CommandBuilder::new().file(missing.clone()), Arc::new(MemorySink::new()))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ScriptFileNotFound);
    assert!(err.message.contains(&missing));
}

#[test]
fn test_session_environment() {
    let engine = ScriptedEngine::default();
    let recorded = engine.recorded.clone();
    let runner = Runner::builder(engine, Box::new(ItemStringifier))
        .env("BUILD_ID", "42")
        .env("PSExecutionPolicyPreference", "RemoteSigned")
        .build();

    runner
        .run(CommandBuilder::new().expression("x"), Arc::new(MemorySink::new()))
        .unwrap();

    assert_eq!(
        recorded.lock().env,
        vec![
            ("PSExecutionPolicyPreference".to_string(), "RemoteSigned".to_string()),
            ("BUILD_ID".to_string(), "42".to_string()),
        ]
    );
}

#[test]
fn test_parameter_set_failure_never_opens_session() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("build.ps1");
    std::fs::write(&script, "").unwrap();
    let script = script.to_string_lossy().to_string();

    let engine = ScriptedEngine::new(vec![Step::Text("never\n")]);
    let recorded = engine.recorded.clone();
    let sink = MemorySink::new();
    let runner = Runner::builder(engine, Box::new(ItemStringifier))
        .parameter_provider(Box::new(NoDefaultSet))
        .build();

    let err = runner
        .run(
            CommandBuilder::new()
                .file(script.clone())
                .auto_parameters([AutoParameter::new("Arg1", "foo")]),
            Arc::new(sink.clone()),
        )
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::ParameterSet);
    assert!(err.is_configuration());
    assert!(err.message.contains(&script));
    assert!(sink.records().is_empty());
    assert_eq!(recorded.lock().opened, 0);
}

#[test]
fn test_auto_parameters_without_provider() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("build.ps1");
    std::fs::write(&script, "").unwrap();

    let engine = ScriptedEngine::default();
    let recorded = engine.recorded.clone();
    let err = runner(engine)
        .run(
            CommandBuilder::new()
                .file(script.to_string_lossy())
                .auto_parameters([AutoParameter::new("Arg1", "foo")]),
            Arc::new(MemorySink::new()),
        )
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::ParameterSet);
    assert_eq!(recorded.lock().opened, 0);
}

#[test]
fn test_command_extension_overrides_runner_default() {
    let dir = tempfile::tempdir().unwrap();
    let module = dir.path().join("tools.psm1");
    std::fs::write(&module, "").unwrap();
    let module = module.to_string_lossy().to_string();

    let engine = ScriptedEngine::default();
    let recorded = engine.recorded.clone();
    let runner = Runner::builder(engine, Box::new(ItemStringifier))
        .script_extension(".ps1")
        .build();

    runner
        .run(
            CommandBuilder::new().file(module.clone()).extension(".psm1"),
            Arc::new(MemorySink::new()),
        )
        .unwrap();
    assert_eq!(recorded.lock().submitted[0].text, format!("& '{}'", module));

    let err = runner
        .run(CommandBuilder::new().file(module), Arc::new(MemorySink::new()))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotAScriptFile);
}
