//! tddgate CLI - Command line interface for the TDD workflow gate
//!
//! Exit codes: 0 allowed, 2 blocked by policy, 3 tooling error.

mod commands;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tddgate_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{CanEditArgs, DetectArgs, Exit, GreenArgs, RedArgs, RunArgs, StateArgs};

/// tddgate: evidence-gated Red-Green-Refactor workflow
#[derive(Parser, Debug)]
#[command(name = "tddgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Base directory for workflow state (overrides config and env)
    #[arg(long, global = true, env = "TDDGATE_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Initialize, inspect or transition a scope's workflow state
    State(StateArgs),

    /// Detect the test framework or the scope root
    Detect(DetectArgs),

    /// Run a test command and classify the outcome
    Run(RunArgs),

    /// Validate the red phase (a single new test failing on an assertion)
    Red(RedArgs),

    /// Validate the green phase (intent test and full suite passing)
    Green(GreenArgs),

    /// Check whether an edit is allowed in the current phase
    CanEdit(CanEditArgs),

    /// Show current configuration
    Config,
}

impl Commands {
    fn wants_json(&self) -> bool {
        match self {
            Commands::State(args) => args.json,
            Commands::Detect(args) => args.json,
            Commands::Run(args) => args.json,
            Commands::Red(args) => args.json,
            Commands::Green(args) => args.json,
            Commands::CanEdit(args) => args.json,
            Commands::Version | Commands::Config => false,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and are not failures
            let code = if e.use_stderr() { 3 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let json = cli.command.as_ref().is_some_and(Commands::wants_json);

    match run(cli).await {
        Ok(exit) => ExitCode::from(exit.code()),
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            if json {
                let _ = output::print_json(&serde_json::json!({
                    "success": false,
                    "error": format!("{:#}", e),
                }));
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::from(3)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Exit> {
    // Load configuration with overrides
    let config = Config::load_with_overrides(cli.state_dir.clone())?;

    tracing::debug!(
        state_dir = %config.state.dir.display(),
        targeted_timeout = ?config.runner.targeted_timeout,
        suite_timeout = ?config.runner.suite_timeout,
        "Configuration loaded"
    );

    match cli.command {
        Some(Commands::Version) => {
            println!("tddgate {}", env!("CARGO_PKG_VERSION"));
            Ok(Exit::Allowed)
        }
        Some(Commands::State(args)) => args.execute(&config),
        Some(Commands::Detect(args)) => args.execute(),
        Some(Commands::Run(args)) => args.execute(&config).await,
        Some(Commands::Red(args)) => args.execute(&config).await,
        Some(Commands::Green(args)) => args.execute(&config).await,
        Some(Commands::CanEdit(args)) => args.execute(&config),
        Some(Commands::Config) => {
            println!("tddgate Configuration");
            println!("=====================");
            println!();
            println!("State:");
            println!("  dir: {}", config.state.dir.display());
            println!();
            println!("Runner:");
            println!(
                "  targeted_timeout: {}s",
                config.runner.targeted_timeout.as_secs()
            );
            println!(
                "  suite_timeout: {}s",
                config.runner.suite_timeout.as_secs()
            );
            println!("  output_limit: {}", config.runner.output_limit);
            println!("  allow_snapshots: {}", config.runner.allow_snapshots);
            println!();
            println!("Git:");
            println!("  include_untracked: {}", config.git.include_untracked);
            println!();
            if let Some(path) = Config::default_config_path() {
                println!("Config file: {}", path.display());
                if path.exists() {
                    println!("  (exists)");
                } else {
                    println!("  (not found - using defaults)");
                }
            }
            Ok(Exit::Allowed)
        }
        None => {
            println!("tddgate - evidence-gated Test-Driven Development workflow");
            println!();
            println!("Use --help for usage information");
            Ok(Exit::Allowed)
        }
    }
}
