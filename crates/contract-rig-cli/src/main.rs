// crates/contract-rig-cli/src/main.rs
// ============================================================================
// Module: Contract Rig CLI Entry Point
// Description: Command dispatcher for contract-testing sessions.
// Purpose: Load configuration, select scenarios, run the session lifecycle,
//          write reports, and map the outcome to an exit code.
// Dependencies: clap, contract-rig-cli, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! `contract-rig run` executes the full lifecycle and exits non-zero when
//! setup fails or any scenario fails. `check-config` validates configuration
//! without starting anything. `migrate` starts the sandbox, provisions the
//! schema, and tears everything down again.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use contract_rig_cli::RunSummary;
use contract_rig_cli::Session;
use contract_rig_cli::SessionParts;
use contract_rig_cli::now_rfc3339;
use contract_rig_cli::selected_scenarios;
use contract_rig_cli::write_reports;
use contract_rig_config::RigConfig;
use contract_rig_scenario::ScenarioRunner;
use contract_rig_scenario::TagFilter;
use contract_rig_scenario::default_registry;
use contract_rig_scenario::load_features;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable holding the tracing filter directive.
const LOG_ENV: &str = "CONTRACT_RIG_LOG";
/// Filter used when [`LOG_ENV`] is unset or invalid.
const DEFAULT_LOG_FILTER: &str = "info";
/// Parent of generated run roots when none is configured.
const DEFAULT_RUN_PARENT: &str = "target/contract-rig";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "contract-rig", version, disable_help_subcommand = true)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the contract suite against a freshly provisioned environment.
    Run(RunCommand),
    /// Validate configuration and environment overrides.
    CheckConfig(ConfigArgs),
    /// Start the sandbox, apply migrations, then tear down.
    Migrate(ConfigArgs),
}

/// Configuration source shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
struct ConfigArgs {
    /// Path to the TOML configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `run`.
#[derive(Args, Debug, Clone, Default)]
struct RunCommand {
    /// Configuration source.
    #[command(flatten)]
    config: ConfigArgs,
    /// Feature directory or file, overriding `scenarios.features_dir`.
    #[arg(long, value_name = "PATH")]
    features: Option<PathBuf>,
    /// Tag expression such as `smoke,~slow`; `~` excludes.
    #[arg(long, value_name = "EXPR")]
    tags: Option<String>,
    /// Also run `@wip` scenarios.
    #[arg(long)]
    include_wip: bool,
}

/// Log output formats.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    match cli.command {
        Commands::Run(command) => command_run(command).await,
        Commands::CheckConfig(args) => command_check_config(&args),
        Commands::Migrate(args) => command_migrate(&args).await,
    }
}

/// Installs the global subscriber; logs go to stderr so stdout stays clean.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)).try_init(),
        LogFormat::Json => {
            registry.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)).try_init()
        }
    };
    if installed.is_err() {
        let _ = write_stderr_line("tracing subscriber already installed");
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Runs a full session and renders its report.
async fn command_run(command: RunCommand) -> CliResult<ExitCode> {
    let mut config = load_config(command.config.config.as_deref())?;
    apply_run_args(&mut config, &command);
    let run_root = config.report.run_root.clone().unwrap_or_else(|| default_run_root(unix_seconds()));

    let features = load_features(&config.scenarios.features_dir).map_err(|err| CliError::new(err.to_string()))?;
    let filter = scenario_filter(&config, command.tags.as_deref());
    let scenarios = selected_scenarios(&features, &filter);
    let runner = ScenarioRunner::new(default_registry().map_err(|err| CliError::new(err.to_string()))?);
    write_out(&format!("selected {} scenario(s) from {} feature(s)", scenarios.len(), features.len()))?;

    let parts = SessionParts::for_config(&config, &run_root).map_err(|err| CliError::new(err.to_string()))?;
    let session = Session::new(config, parts);
    let (summary, code) = match session.run(&runner, &scenarios).await {
        Ok(outcome) => {
            let code = if outcome.failed() == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE };
            (RunSummary::from_outcome(&outcome, now_rfc3339()), code)
        }
        Err(err) => {
            write_err(&format!("setup failed ({}): {err}", err.stage()))?;
            (RunSummary::from_setup_error(&err, now_rfc3339()), ExitCode::FAILURE)
        }
    };

    for scenario in &summary.scenarios {
        write_out(&format!("{:<7} {} / {}", scenario.status.as_str(), scenario.feature, scenario.name))?;
        if let Some(failure) = &scenario.failure {
            write_out(&format!("        {} [{}]: {}", failure.step, failure.kind, failure.message))?;
        }
    }
    write_out(&format!(
        "{}: {} run, {} passed, {} failed",
        summary.status.as_str(),
        summary.totals.scenarios,
        summary.totals.passed,
        summary.totals.failed
    ))?;
    let (json_path, markdown_path) =
        write_reports(&run_root, &summary).map_err(|err| CliError::new(err.to_string()))?;
    write_out(&format!("reports: {} {}", json_path.display(), markdown_path.display()))?;
    Ok(code)
}

/// Validates the configuration without touching any store.
fn command_check_config(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    write_out(&format!(
        "configuration ok: {} target(s), {} fixture row(s), features in {}",
        config.scenarios.targets.len(),
        config.fixtures.rows.len(),
        config.scenarios.features_dir.display()
    ))?;
    Ok(ExitCode::SUCCESS)
}

/// Applies migrations against an already running relational store.
async fn command_migrate(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    let run_root = config.report.run_root.clone().unwrap_or_else(|| default_run_root(unix_seconds()));
    let parts = SessionParts::for_config(&config, &run_root).map_err(|err| CliError::new(err.to_string()))?;
    let mut session = Session::new(config, parts);
    let provisioned = session.provision().await;
    session.teardown().await;
    let (_, report) = provisioned.map_err(|err| CliError::new(err.to_string()))?;
    write_out(&format!(
        "migrations: {} applied, {} already applied, {} failed, {} skipped{}",
        report.applied.len(),
        report.benign.len(),
        report.failed.len(),
        report.skipped.len(),
        if report.baseline { " (baseline schema)" } else { "" }
    ))?;
    Ok(if report.failed.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads the configuration file and layers environment overrides.
fn load_config(path: Option<&Path>) -> CliResult<RigConfig> {
    RigConfig::load_with_env(path).map_err(|err| CliError::new(err.to_string()))
}

/// Layers `run` flags over loaded configuration.
fn apply_run_args(config: &mut RigConfig, command: &RunCommand) {
    if let Some(features) = &command.features {
        config.scenarios.features_dir.clone_from(features);
    }
    if command.include_wip {
        config.scenarios.include_wip = true;
    }
}

/// Configured tag filter extended by a command-line expression.
fn scenario_filter(config: &RigConfig, tags: Option<&str>) -> TagFilter {
    let mut filter = TagFilter::from_config(&config.scenarios);
    if let Some(expression) = tags {
        filter.extend_from_expression(expression);
    }
    filter
}

/// Per-run artifact directory keyed by start time.
fn default_run_root(unix_seconds: u64) -> PathBuf {
    Path::new(DEFAULT_RUN_PARENT).join(format!("run-{unix_seconds}"))
}

/// Seconds since the Unix epoch, zero when the clock is before it.
fn unix_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_secs())
}

/// Writes one line to stdout.
fn write_out(message: &str) -> CliResult<()> {
    write_stdout_line(message).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes one line to stderr.
fn write_err(message: &str) -> CliResult<()> {
    write_stderr_line(message).map_err(|err| CliError::new(output_error("stderr", &err)))
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output failure message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
