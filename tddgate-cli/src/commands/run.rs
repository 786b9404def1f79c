//! Run command - Execute a test command and classify its outcome

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use tddgate_core::workflow::test_runner::truncate;
use tddgate_core::workflow::{build_command, TestRunner};
use tddgate_core::Config;

use super::{scope, Exit};
use crate::output::print_json;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Base test command (e.g. "pytest -q")
    #[arg(long)]
    pub command: String,

    /// Framework name used to classify the output
    #[arg(long)]
    pub framework: String,

    /// Working directory
    #[arg(long, default_value = ".")]
    pub cwd: PathBuf,

    /// Test file to target
    #[arg(long)]
    pub test_file: Option<String>,

    /// Timeout in seconds (defaults to the configured targeted or suite timeout)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Treat snapshot mismatches as semantic failures
    #[arg(long)]
    pub allow_snapshots: bool,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Execute the run command
    ///
    /// Succeeds whenever the command ran; the classification is in the
    /// output.
    pub async fn execute(&self, config: &Config) -> anyhow::Result<Exit> {
        let cwd = scope(&self.cwd)?;
        let timeout = match (self.timeout, &self.test_file) {
            (Some(secs), _) => Duration::from_secs(secs),
            (None, Some(_)) => config.runner.targeted_timeout,
            (None, None) => config.runner.suite_timeout,
        };

        let cmd = build_command(&self.command, &self.framework, self.test_file.as_deref());
        let runner = TestRunner::new(self.allow_snapshots || config.runner.allow_snapshots);
        let mut result = runner.run(cmd, &cwd, timeout, &self.framework).await?;

        result.stdout = truncate(&result.stdout, config.runner.output_limit);
        result.stderr = truncate(&result.stderr, config.runner.output_limit);

        if self.json {
            print_json(&result)?;
        } else {
            println!("Command: {}", result.cmd.join(" "));
            println!("Outcome: {}", result.outcome);
            match result.exit_code {
                Some(code) => println!("Exit code: {}", code),
                None => println!("Exit code: (none)"),
            }
            println!("Duration: {}ms", result.duration_ms);
            println!("Signals: {}", result.signal_summary());
            println!("Excerpt hash: {}", result.excerpt_hash);
        }

        Ok(Exit::Allowed)
    }
}
