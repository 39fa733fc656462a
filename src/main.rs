//! `reality-parser` - turn a folder of captured images into a 3D model
//!
//! This binary binds the reconstruction session core to the terminal: it
//! resolves settings, starts one session, renders its progress and maps
//! the outcome to the exit code.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use console::Style;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::output::{ConsoleProgress, OutputFormatter};
use reality_parser_core::config::{self, Config};
use reality_parser_core::engine::{CommandEngine, ReconstructionEngine, ScriptedEngine};
use reality_parser_core::{ProcessOptions, SessionOrchestrator, SessionState};

mod cli;
mod output;

/// How long the engine gets to confirm a Ctrl-C before the session is torn down
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

const DRY_RUN_STEPS: usize = 20;
const DRY_RUN_INTERVAL: Duration = Duration::from_millis(150);

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.version {
        let blue = Style::new().blue();
        println!(
            "{} v{} ({})",
            blue.apply_to("reality-parser"),
            env!("CARGO_PKG_VERSION"),
            env!("GIT_HASH")
        );
        return Ok(ExitCode::SUCCESS);
    }

    init_logging(cli.verbose);

    let formatter = OutputFormatter::new();
    let (config_path, config) = load_config(cli.config.clone())?;

    match cli.command {
        Some(Commands::Process {
            input,
            output,
            detail,
            ordering,
            sensitivity,
            result,
            dry_run,
        }) => {
            let options = ProcessOptions::new(input, output)
                .detail(detail.unwrap_or_else(|| config.defaults.detail.clone()))
                .ordering(ordering.unwrap_or_else(|| config.defaults.ordering.clone()))
                .sensitivity(sensitivity.unwrap_or_else(|| config.defaults.sensitivity.clone()));
            let options = match result {
                Some(result) => options.result_path(result),
                None => options,
            };

            if dry_run {
                // Nothing the user owns is touched: destination and scratch
                // live in a temporary directory removed on exit.
                let sandbox = DryRun::new()?;
                let options = sandbox.redirect(options);
                let engine = Arc::new(sandbox.engine(&options));
                let orchestrator = SessionOrchestrator::new(engine, sandbox.scratch_dir());
                return handle_process(orchestrator, options, true, &formatter).await;
            }

            let engine = Arc::new(command_engine(&config));
            let orchestrator = SessionOrchestrator::new(engine, &config.engine.scratch_dir);
            handle_process(orchestrator, options, false, &formatter).await
        }

        Some(Commands::Check) => {
            let engine = command_engine(&config);
            let supported = engine.is_supported();
            formatter.print_check(engine.program(), supported);
            Ok(if supported {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Some(Commands::Config) => {
            formatter.print_config(config_path.as_deref(), &config);
            Ok(ExitCode::SUCCESS)
        }

        None => {
            Cli::command().print_help()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// `RUST_LOG` wins; otherwise warnings only, or info with `--verbose`
fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Explicit `--config` must exist; otherwise search the standard locations
fn load_config(explicit: Option<PathBuf>) -> Result<(Option<PathBuf>, Config)> {
    match explicit {
        Some(path) => {
            let config = Config::load(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            Ok((Some(path), config))
        }
        None => {
            let config = Config::load_or_default().context("Failed to load configuration")?;
            Ok((config::find_config_file(), config))
        }
    }
}

fn command_engine(config: &Config) -> CommandEngine {
    CommandEngine::new(&config.engine.program, &config.engine.scratch_dir)
        .with_args(config.engine.args.clone())
}

/// Throwaway destination and scratch directory for `--dry-run`
struct DryRun {
    dir: TempDir,
}

impl DryRun {
    fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("reality-parser-dry-run")
            .tempdir()
            .context("Failed to create dry-run directory")?;
        Ok(Self { dir })
    }

    fn scratch_dir(&self) -> PathBuf {
        self.dir.path().join("modelTemp")
    }

    /// Same options, but writing into the sandbox under the output's file name
    fn redirect(&self, options: ProcessOptions) -> ProcessOptions {
        let name = options
            .output
            .file_name()
            .unwrap_or_else(|| OsStr::new("model.usdz"))
            .to_owned();
        ProcessOptions {
            output: self.dir.path().join(name),
            ..options
        }
    }

    fn engine(&self, options: &ProcessOptions) -> ScriptedEngine {
        ScriptedEngine::demo(&options.output, DRY_RUN_STEPS, DRY_RUN_INTERVAL)
    }
}

async fn handle_process(
    orchestrator: SessionOrchestrator,
    options: ProcessOptions,
    dry_run: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    if let Err(e) = orchestrator
        .process(options, Arc::new(ConsoleProgress::new(dry_run)))
        .await
    {
        if e.is_setup_error() {
            let message = format!("Could not start reconstruction: {}", e.user_message());
            formatter.print_error(&message);
        } else {
            formatter.print_error(&e.user_message());
        }
        return Ok(ExitCode::FAILURE);
    }

    if let Some(record) = orchestrator.snapshot() {
        formatter.print_started(&record, dry_run);
    }

    let state = tokio::select! {
        state = orchestrator.wait() => state,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            orchestrator.cancel_session();
            orchestrator.shutdown(SHUTDOWN_GRACE).await
        }
    };

    if let Some(record) = orchestrator.snapshot() {
        if let (SessionState::Completed, Some(result), false) =
            (record.state, &record.result_path, dry_run)
        {
            println!("Result path: {}", result.display());
        }
    }

    Ok(match state {
        Some(SessionState::Completed) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_orchestrator(sandbox: &DryRun, options: &ProcessOptions) -> SessionOrchestrator {
        let engine = ScriptedEngine::demo(&options.output, 2, Duration::from_millis(1));
        SessionOrchestrator::new(Arc::new(engine), sandbox.scratch_dir())
    }

    #[tokio::test]
    async fn test_dry_run_leaves_real_output_alone() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("images");
        std::fs::create_dir_all(&input).unwrap();
        let output = temp.path().join("model.usdz");
        std::fs::write(&output, b"existing model").unwrap();

        let sandbox = DryRun::new().unwrap();
        let options = sandbox.redirect(ProcessOptions::new(&input, &output));
        assert_ne!(options.output, output);
        assert!(options.output.starts_with(sandbox.dir.path()));
        assert_eq!(options.output.file_name(), output.file_name());

        let orchestrator = demo_orchestrator(&sandbox, &options);
        orchestrator
            .process(options, Arc::new(ConsoleProgress::new(true)))
            .await
            .unwrap();
        assert_eq!(orchestrator.wait().await, Some(SessionState::Completed));

        assert_eq!(std::fs::read(&output).unwrap(), b"existing model");
    }

    #[tokio::test]
    async fn test_dry_run_purges_only_its_own_scratch() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("images");
        std::fs::create_dir_all(&input).unwrap();

        let sandbox = DryRun::new().unwrap();
        std::fs::create_dir_all(sandbox.scratch_dir()).unwrap();
        std::fs::write(sandbox.scratch_dir().join("depth.tmp"), b"tmp").unwrap();
        let options = sandbox.redirect(ProcessOptions::new(&input, temp.path().join("out.usdz")));

        let orchestrator = demo_orchestrator(&sandbox, &options);
        orchestrator
            .process(options, Arc::new(ConsoleProgress::new(true)))
            .await
            .unwrap();
        assert_eq!(orchestrator.wait().await, Some(SessionState::Completed));
        assert_eq!(std::fs::read_dir(sandbox.scratch_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_redirect_without_file_name() {
        let sandbox = DryRun::new().unwrap();
        let options = sandbox.redirect(ProcessOptions::new("images", "/"));
        assert_eq!(options.output, sandbox.dir.path().join("model.usdz"));
    }
}
