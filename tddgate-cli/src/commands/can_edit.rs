//! Can-edit command - Ask whether an edit fits the current phase

use std::path::PathBuf;

use clap::{ArgGroup, Args};
use serde_json::json;
use tddgate_core::workflow::EditType;
use tddgate_core::Config;

use super::{scope, state_machine, Exit};
use crate::output::print_json;

/// Arguments for the can-edit command
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("kind").required(true).args(["production", "test"])))]
pub struct CanEditArgs {
    /// Scope root directory
    #[arg(long, required = true)]
    pub scope_root: PathBuf,

    /// Edit to production code
    #[arg(long)]
    pub production: bool,

    /// Edit to test code
    #[arg(long)]
    pub test: bool,

    /// Kind of test edit: modify, strengthen or weaken
    #[arg(long, default_value = "modify")]
    pub edit_type: String,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

impl CanEditArgs {
    /// Execute the can-edit command
    pub fn execute(&self, config: &Config) -> anyhow::Result<Exit> {
        let scope_root = scope(&self.scope_root)?;
        let edit: EditType = self.edit_type.parse()?;
        let state = state_machine(config).require(&scope_root)?;
        let phase = state.current_phase;

        let (target, allowed) = if self.production {
            ("production".to_string(), phase.can_edit_production())
        } else {
            (format!("test ({})", self.edit_type), phase.can_edit_test(edit))
        };

        let verdict = if allowed { "allowed" } else { "not allowed" };
        let message = format!("{} edit {} in {}", target, verdict, phase);

        if self.json {
            print_json(&json!({
                "allowed": allowed,
                "phase": phase,
                "target": target,
                "message": message,
            }))?;
        } else {
            println!("{}", message);
            println!("  {}", phase.description());
        }

        Ok(Exit::from_allowed(allowed))
    }
}
