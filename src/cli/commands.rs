//! CLI command definitions for sim-harness.
//!
//! `run` tests one program or a directory of programs against a suite,
//! `check` parses and validates a suite without touching a simulator.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::batch::{discover_programs, BatchCoordinator};
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::logging::{FileLog, RunLog};
use crate::runner::{IntervalTicker, RunSpec};
use crate::simulator::process::DEFAULT_INPUT_PROMPT;
use crate::simulator::{CommandTemplate, ProcessSimulator, ProcessSimulatorConfig};
use crate::suite::Suite;

/// Default extension of assembled programs.
const DEFAULT_ARTIFACT_EXT: &str = "mex";

/// Default assembler side files removed after assembly.
const DEFAULT_AUX_EXT: &str = "lst,map";

/// Automated correctness tester for programs run on an external simulator.
#[derive(Parser)]
#[command(name = "sim-harness")]
#[command(about = "Test assembly programs against expected output on a simulator")]
#[command(version)]
#[command(
    long_about = "sim-harness assembles programs, runs them on a simulator, feeds input when the simulator asks for it, and compares the output with a suite of expectations.\n\nExample usage:\n  sim-harness run programs/ --suite multiply.yaml --assembler 'masm {source}' --simulator 'msim --in {input_mode} --out {output_mode} {artifact}'"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Test one program, or every program in a directory, against a suite.
    Run(RunArgs),

    /// Parse and validate a suite file, then print its runs.
    Check(CheckArgs),
}

/// Arguments for `sim-harness run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Program source file, or directory of program sources.
    pub path: PathBuf,

    /// Suite file with the runs to perform on every program.
    #[arg(short = 's', long)]
    pub suite: PathBuf,

    /// Simulator command. Placeholders: {artifact}, {input_mode}, {output_mode}.
    #[arg(long, env = "HARNESS_SIMULATOR")]
    pub simulator: String,

    /// Assembler command. Placeholders: {source}, {artifact}, {artifact_stem}.
    #[arg(long, env = "HARNESS_ASSEMBLER")]
    pub assembler: String,

    /// Extension of the assembled program.
    #[arg(long, default_value = DEFAULT_ARTIFACT_EXT)]
    pub artifact_ext: String,

    /// Comma-separated extensions of assembler side files to delete.
    #[arg(long, value_delimiter = ',', default_value = DEFAULT_AUX_EXT)]
    pub aux_ext: Vec<String>,

    /// Line the simulator prints when it waits for one input value.
    #[arg(long, default_value = DEFAULT_INPUT_PROMPT)]
    pub input_prompt: String,

    /// Extension of program sources when testing a directory.
    #[arg(long)]
    pub source_ext: Option<String>,

    /// Tick interval in milliseconds.
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Default poll budget for runs that do not set one.
    #[arg(long)]
    pub max_polls: Option<u32>,

    /// Delay before the first tick in milliseconds.
    #[arg(long)]
    pub start_delay_ms: Option<u64>,

    /// Keep the simulator open after the last run until Ctrl-C.
    #[arg(long)]
    pub keep_open: bool,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Exit with an error if any run fails or any program is skipped.
    #[arg(long)]
    pub fail_on_mismatch: bool,
}

/// Arguments for `sim-harness check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Suite file to validate.
    pub suite: PathBuf,

    /// Default poll budget for runs that do not set one.
    #[arg(long)]
    pub max_polls: Option<u32>,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_run_command(args).await,
        Commands::Check(args) => run_check_command(args),
    }
}

// ============================================================================
// Run Command Implementation
// ============================================================================

/// Applies command-line overrides on top of the environment configuration.
fn build_config(args: &RunArgs) -> Result<HarnessConfig, HarnessError> {
    let mut config = HarnessConfig::from_env()?;

    if let Some(ms) = args.poll_interval_ms {
        config = config.with_poll_interval(Duration::from_millis(ms));
    }
    if let Some(ms) = args.start_delay_ms {
        config = config.with_start_delay(Duration::from_millis(ms));
    }
    if let Some(max_polls) = args.max_polls {
        config = config.with_default_max_polls(max_polls);
    }
    if let Some(ext) = &args.source_ext {
        config = config.with_source_extension(ext.clone());
    }
    if args.keep_open {
        config = config.with_close_on_completion(false);
    }

    config.validate()?;
    Ok(config)
}

fn build_simulator(args: &RunArgs) -> Result<ProcessSimulator, HarnessError> {
    let config = ProcessSimulatorConfig::new(
        CommandTemplate::parse(&args.assembler)?,
        CommandTemplate::parse(&args.simulator)?,
    )
    .with_artifact_extension(args.artifact_ext.clone())
    .with_auxiliary_extensions(args.aux_ext.clone())
    .with_input_prompt(args.input_prompt.clone());

    Ok(ProcessSimulator::new(config)?)
}

async fn run_run_command(args: RunArgs) -> anyhow::Result<()> {
    let config = build_config(&args)?;
    let suite = Suite::load(&args.suite)?;
    suite.validate(config.default_max_polls)?;

    let mut log = FileLog::new();
    let selection = match discover_programs(&args.path, &config.source_extension) {
        Ok(selection) => selection,
        Err(HarnessError::MissingResource(path)) => {
            log.line(&format!("Could not find {}", path.display()));
            return Err(HarnessError::MissingResource(path).into());
        }
        Err(e) => return Err(e.into()),
    };
    if selection.is_empty() {
        warn!(
            dir = %args.path.display(),
            ext = %config.source_extension,
            "No programs found"
        );
    }

    let target = build_simulator(&args)?;
    let programs: Vec<_> = selection
        .programs
        .iter()
        .map(|source| suite.program(source, config.default_max_polls))
        .collect();

    info!(
        suite = suite.display_name(),
        programs = programs.len(),
        runs_per_program = suite.runs.len(),
        io_modes = %suite.io_modes(),
        default_run_budget_ms = config.run_budget(config.default_max_polls).as_millis() as u64,
        "Test session configured"
    );

    let ticker = IntervalTicker::new(config.poll_interval, config.start_delay);
    let close_on_completion = config.close_on_completion;
    let mut coordinator = BatchCoordinator::new(target, log, ticker, config);

    let shutdown = coordinator.shutdown_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling test session");
            let _ = shutdown.send(());
        }
    });

    let result = coordinator.run(&programs, selection.mode).await;
    interrupt.abort();

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(close_err) = coordinator.close().await {
                warn!(error = %close_err, "Failed to shut down simulator");
            }
            return Err(e.into());
        }
    };

    if args.json {
        println!("{}", summary.to_json()?);
    } else {
        println!("\n=== Test Results ===");
        println!("{}", summary);
    }

    if !close_on_completion {
        info!("Test session complete, simulator kept open until Ctrl-C");
        tokio::signal::ctrl_c().await?;
    }
    coordinator.close().await?;

    if args.fail_on_mismatch && !summary.all_passed() {
        anyhow::bail!(
            "{} of {} runs failed, {} programs skipped",
            summary.failed,
            summary.runs_total,
            summary.skipped_programs
        );
    }

    Ok(())
}

// ============================================================================
// Check Command Implementation
// ============================================================================

#[derive(Debug, Serialize)]
struct CheckOutput<'a> {
    suite: &'a str,
    io_modes: String,
    runs: Vec<RunSpec>,
}

fn run_check_command(args: CheckArgs) -> anyhow::Result<()> {
    let default_max_polls = match args.max_polls {
        Some(max_polls) => max_polls,
        None => HarnessConfig::from_env()?.default_max_polls,
    };

    let suite = Suite::load(&args.suite)?;
    suite.validate(default_max_polls)?;
    let runs = suite.run_specs(default_max_polls);

    if args.json {
        let output = CheckOutput {
            suite: suite.display_name(),
            io_modes: suite.io_modes().to_string(),
            runs,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("✓ Suite {} is valid", suite.display_name());
    println!("  I/O modes: {}", suite.io_modes());
    for (index, run) in runs.iter().enumerate() {
        println!(
            "  run {}: input {} | expected {} | max polls {}",
            index + 1,
            run.input_display(),
            run.expected.as_deref().unwrap_or("(none)"),
            run.max_polls
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::try_parse_from([
            "sim-harness",
            "run",
            "programs/",
            "--suite",
            "multiply.yaml",
            "--assembler",
            "masm {source}",
            "--simulator",
            "msim {artifact}",
            "--aux-ext",
            "lst,map,sym",
            "--max-polls",
            "5",
            "--keep-open",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.path, PathBuf::from("programs/"));
        assert_eq!(args.aux_ext, vec!["lst", "map", "sym"]);
        assert_eq!(args.artifact_ext, "mex");
        assert_eq!(args.input_prompt, "?INPUT");
        assert_eq!(args.max_polls, Some(5));
        assert!(args.keep_open);
        assert!(!args.json);
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_parse_check_args() {
        let cli =
            Cli::try_parse_from(["sim-harness", "check", "suite.yaml", "-l", "debug"]).unwrap();
        assert_eq!(cli.log_level, "debug");
        let Commands::Check(args) = cli.command else {
            panic!("expected check command");
        };
        assert_eq!(args.suite, PathBuf::from("suite.yaml"));
        assert_eq!(args.max_polls, None);
    }

    #[test]
    fn test_build_config_overrides() {
        let cli = Cli::try_parse_from([
            "sim-harness",
            "run",
            "p.mas",
            "-s",
            "s.yaml",
            "--assembler",
            "a",
            "--simulator",
            "b",
            "--poll-interval-ms",
            "250",
            "--source-ext",
            "asm",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };

        let config = build_config(&args).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.source_extension, "asm");
        assert!(config.close_on_completion);
    }

    #[test]
    fn test_build_config_rejects_zero_interval() {
        let cli = Cli::try_parse_from([
            "sim-harness",
            "run",
            "p.mas",
            "-s",
            "s.yaml",
            "--assembler",
            "a",
            "--simulator",
            "b",
            "--poll-interval-ms",
            "0",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert!(matches!(build_config(&args), Err(HarnessError::Config(_))));
    }
}
