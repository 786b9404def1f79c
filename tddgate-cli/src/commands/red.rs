//! Red command - Validate that the pending red phase has a failing test

use std::path::PathBuf;

use clap::Args;
use tddgate_core::git::GitChanges;
use tddgate_core::workflow::{RedValidator, TestRunner};
use tddgate_core::Config;

use super::{scope, state_machine, Exit};
use crate::output::print_report;

/// Arguments for the red command
#[derive(Args, Debug)]
pub struct RedArgs {
    /// Scope root directory
    #[arg(long, required = true)]
    pub scope_root: PathBuf,

    /// Treat snapshot mismatches as semantic failures
    #[arg(long)]
    pub allow_snapshots: bool,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

impl RedArgs {
    /// Execute the red command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<Exit> {
        let scope_root = scope(&self.scope_root)?;

        let validator = RedValidator::new(
            state_machine(config),
            TestRunner::new(self.allow_snapshots || config.runner.allow_snapshots),
            GitChanges::new(config.git.include_untracked),
            &config.runner,
        );
        let report = validator.validate(&scope_root).await?;

        print_report(&report, self.json)?;
        Ok(Exit::from_allowed(report.allowed))
    }
}
