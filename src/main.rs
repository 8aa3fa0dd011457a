//! Purpose: `benchtop` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit stable JSON envelopes on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All manifest rewrites go through `api::LocalClient` (locked).
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{
    CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use std::time::{SystemTime, UNIX_EPOCH};

mod command_dispatch;
mod env_json;

use benchtop::api::{
    EnvRef, Environment, Error, ErrorKind, LocalClient, PackageRef, RunOptions,
    ValidationStatus, default_root_dir, to_exit_code,
};
use benchtop::notice::{Notice, notice_json};
use env_json::{env_json, package_set_json, report_json, resolution_json, run_json};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `benchtop --help`."));
            }
        },
    };

    let root_dir = cli.dir.unwrap_or_else(default_root_dir);
    command_dispatch::dispatch_command(cli.command, root_dir)
}

#[derive(Parser)]
#[command(
    name = "benchtop",
    version,
    about = "Declarative environment manifests and experiment run journals",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Environments are declarative manifests; runs are timestamped journals.

Mental model:
  - `env` authors and evaluates environment manifests (pure data)
  - `run` creates and annotates run directories (params, source snapshots)
"#,
    after_help = r#"EXAMPLES
  $ benchtop env create tensorflowEnv \
      --package python3Packages/python --package python3Packages/numpy
  $ benchtop env eval tensorflowEnv
  $ benchtop run new baseline --env tensorflowEnv --source train.py
  $ benchtop run record ~/.benchtop/runs/baseline/2026-08-07-12-00-00 \
      --param learning_rate=0.001
"#
)]
struct Cli {
    #[arg(
        long,
        help = "Root directory for manifests and runs (default: ~/.benchtop)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Author and evaluate environment manifests"
    )]
    Env {
        #[command(subcommand)]
        command: EnvCommand,
    },
    #[command(
        arg_required_else_help = true,
        about = "Create and annotate experiment run journals"
    )]
    Run {
        #[command(subcommand)]
        command: RunCommand,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version information as JSON")]
    Version,
}

#[derive(Subcommand)]
enum EnvCommand {
    #[command(about = "Create a new environment manifest")]
    Create {
        name: String,
        #[arg(
            long = "package",
            value_name = "COLLECTION/NAME",
            help = "Package reference to include; repeatable"
        )]
        packages: Vec<String>,
    },
    #[command(about = "Print a manifest as JSON")]
    Show { env: String },
    #[command(about = "Append package references to a manifest")]
    Add {
        env: String,
        #[arg(required = true, value_name = "COLLECTION/NAME")]
        packages: Vec<String>,
    },
    #[command(about = "Remove package references from a manifest")]
    Remove {
        env: String,
        #[arg(required = true, value_name = "COLLECTION/NAME")]
        packages: Vec<String>,
    },
    #[command(
        about = "Evaluate a manifest to its package set",
        long_about = "Evaluate a manifest: emit the package set tagged with the environment \
name. With --catalog, resolve each reference to an artifact; an unknown \
reference fails the evaluation instead of being dropped."
    )]
    Eval {
        env: String,
        #[arg(long, value_hint = ValueHint::FilePath)]
        catalog: Option<PathBuf>,
    },
    #[command(about = "List manifests under the envs directory")]
    List,
    #[command(about = "Structurally check a manifest and print a report")]
    Doctor { env: String },
}

#[derive(Subcommand)]
enum RunCommand {
    #[command(about = "Create a timestamped run directory")]
    New {
        label: String,
        #[arg(long, help = "Record the named environment in the run metadata")]
        env: Option<String>,
        #[arg(
            long,
            value_hint = ValueHint::FilePath,
            help = "Snapshot this file into the run directory"
        )]
        source: Option<PathBuf>,
    },
    #[command(about = "Merge params into a run and persist params.json")]
    Record {
        dir: PathBuf,
        #[arg(
            long = "param",
            required = true,
            value_name = "KEY=VALUE",
            help = "Param to record; VALUE is parsed as JSON, else kept as a string"
        )]
        params: Vec<String>,
    },
    #[command(about = "Resolve a path under a run directory, creating folders")]
    Path {
        dir: PathBuf,
        relative: PathBuf,
        #[arg(long, help = "Do not create the directory portion")]
        no_create: bool,
    },
    #[command(about = "Print run metadata and params as JSON")]
    Show { dir: PathBuf },
    #[command(about = "List run directories for a label, oldest first")]
    List { label: String },
}

fn parse_env_ref(input: &str) -> EnvRef {
    if input.contains('/') || input.contains('\\') {
        EnvRef::path(input)
    } else {
        EnvRef::name(input)
    }
}

fn parse_package_args(inputs: &[String]) -> Result<Vec<PackageRef>, Error> {
    inputs.iter().map(|input| input.parse()).collect()
}

/// Splits `key=value`, parsing the value as JSON and falling back to a
/// plain string when it is not valid JSON.
fn parse_param_arg(input: &str) -> Result<(String, Value), Error> {
    let Some((key, raw)) = input.split_once('=') else {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid param: {input:?}"))
            .with_hint("Use the form key=value, e.g. learning_rate=0.001."));
    };
    if key.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("param has an empty key: {input:?}")));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn emit_output(value: &Value) {
    let json = serde_json::to_string(value)
        .unwrap_or_else(|_| "{\"error\":{\"kind\":\"Internal\"}}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn notice_time_now() -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128).ok()?;
    ts.format(&Rfc3339).ok()
}

fn emit_notice(notice: &Notice) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("notice: {} (env: {})", notice.message, notice.env);
        return;
    }

    let value = notice_json(notice);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn empty_package_set_notice(cmd: &str, env: &Environment) -> Notice {
    let mut details = Map::new();
    details.insert("packages".to_string(), json!(0));
    Notice {
        kind: "empty-package-set".to_string(),
        time: notice_time_now().unwrap_or_default(),
        cmd: cmd.to_string(),
        env: env.name.clone(),
        message: "environment declares no packages; the shell will only contain implicit defaults"
            .to_string(),
        details,
    }
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::AlreadyExists => "already exists".to_string(),
        ErrorKind::Busy => "resource is busy".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(reference) = err.reference() {
        inner.insert("reference".to_string(), json!(reference));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = Vec::new();
    lines.push(format!("error: {}", error_message(err)));

    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(reference) = err.reference() {
        lines.push(format!("reference: {reference}"));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!("caused by: {cause}"));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_env("BENCHTOP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}
