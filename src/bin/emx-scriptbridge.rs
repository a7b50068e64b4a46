//! emx-scriptbridge CLI
//!
//! Run a script expression or script file and print build diagnostics.

use anyhow::{bail, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use emx_scriptbridge::{
    AutoParameter, CommandBuilder, ConsoleSink, LineStringifier, ProcessEngine,
    ProcessParameterProvider, Runner, DEFAULT_INTERPRETER, SCRIPT_EXTENSION,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "emx-scriptbridge")]
#[command(author = "nzinfo <li.monan@gmail.com>")]
#[command(version)]
#[command(about = "Run a script and report its output as build diagnostics")]
struct Cli {
    /// Script text to run
    #[arg(short = 'c', long)]
    expression: Option<String>,

    /// Script file to run
    #[arg(short, long)]
    file: Option<String>,

    /// Raw argument text appended to the file invocation
    #[arg(short, long)]
    arguments: Option<String>,

    /// Bind NAME=VALUE to the script's default parameter set (repeatable)
    #[arg(short = 'p', long = "auto-parameter")]
    auto_parameters: Vec<String>,

    /// Interpreter executable
    #[arg(long, default_value = DEFAULT_INTERPRETER)]
    interpreter: String,

    /// Script file extension
    #[arg(long = "extension", default_value = SCRIPT_EXTENSION)]
    extension: String,

    /// Session environment variables (KEY=VALUE)
    #[arg(short = 'e', long = "env")]
    env_vars: Vec<String>,

    /// Show debug and verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error : {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn run(cli: Cli) -> Result<bool> {
    let mut command = CommandBuilder::new();
    if let Some(expression) = cli.expression {
        command = command.expression(expression);
    }
    if let Some(file) = cli.file {
        command = command.file(file);
    }
    if let Some(arguments) = cli.arguments {
        command = command.arguments(arguments);
    }
    if !cli.auto_parameters.is_empty() {
        let params = cli
            .auto_parameters
            .iter()
            .map(|p| split_pair(p).map(|(k, v)| AutoParameter::new(k, v)))
            .collect::<Result<Vec<_>>>()?;
        command = command.auto_parameters(params);
    }

    let mut builder = Runner::builder(
        ProcessEngine::new(cli.interpreter.clone()),
        Box::new(LineStringifier),
    )
    .parameter_provider(Box::new(ProcessParameterProvider::new(cli.interpreter)))
    .script_extension(cli.extension);
    for pair in &cli.env_vars {
        let (k, v) = split_pair(pair)?;
        builder = builder.env(k, v);
    }
    let runner = builder.build();

    let sink = Arc::new(ConsoleSink { verbose: cli.verbose });
    let summary = runner.run(command, sink)?;
    tracing::debug!(%summary, "done");
    Ok(summary.succeeded())
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k, v)),
        _ => bail!("expected NAME=VALUE, got '{}'", pair),
    }
}
