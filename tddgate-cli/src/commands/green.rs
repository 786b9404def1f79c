//! Green command - Validate that the intent test and the suite now pass

use std::path::PathBuf;

use clap::Args;
use tddgate_core::workflow::{GreenValidator, TestRunner};
use tddgate_core::Config;

use super::{scope, state_machine, Exit};
use crate::output::print_report;

/// Arguments for the green command
#[derive(Args, Debug)]
pub struct GreenArgs {
    /// Scope root directory
    #[arg(long, required = true)]
    pub scope_root: PathBuf,

    /// Only re-run the intent test and defer the full suite
    #[arg(long)]
    pub skip_full_suite: bool,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

impl GreenArgs {
    /// Execute the green command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<Exit> {
        let scope_root = scope(&self.scope_root)?;

        let validator = GreenValidator::new(
            state_machine(config),
            TestRunner::new(config.runner.allow_snapshots),
            &config.runner,
        );
        let report = validator
            .validate(&scope_root, self.skip_full_suite)
            .await?;

        print_report(&report, self.json)?;
        Ok(Exit::from_allowed(report.allowed))
    }
}
