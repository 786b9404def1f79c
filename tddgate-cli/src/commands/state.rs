//! State command - Initialize, inspect or transition a scope

use std::path::PathBuf;

use clap::Args;
use serde_json::json;
use tddgate_core::workflow::{TddPhase, TransitionOutcome};
use tddgate_core::{Config, Error};

use super::{scope, state_machine, Exit};
use crate::output::print_json;

/// Arguments for the state command
#[derive(Args, Debug)]
pub struct StateArgs {
    /// Scope root directory
    #[arg(long, required = true)]
    pub scope_root: PathBuf,

    /// Start a new workflow in IDLE, replacing any existing state
    #[arg(long)]
    pub init: bool,

    /// Target phase for a transition (e.g. RED_PENDING)
    #[arg(long)]
    pub phase: Option<String>,

    /// Evidence recorded with the transition
    #[arg(long, requires = "phase")]
    pub evidence: Option<String>,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

impl StateArgs {
    /// Execute the state command
    pub fn execute(&self, config: &Config) -> anyhow::Result<Exit> {
        let scope_root = scope(&self.scope_root)?;
        let machine = state_machine(config);

        // Validate the target before touching anything
        let target = self
            .phase
            .as_deref()
            .map(str::parse::<TddPhase>)
            .transpose()?;

        if self.init {
            let state = machine.init(&scope_root)?;
            if target.is_none() {
                let message = "State initialized";
                if self.json {
                    print_json(&json!({
                        "success": true,
                        "phase": state.current_phase,
                        "message": message,
                    }))?;
                } else {
                    println!("{}", message);
                }
                return Ok(Exit::Allowed);
            }
        }

        let mut state = machine.require(&scope_root)?;

        let Some(target) = target else {
            print_json(&json!({
                "success": true,
                "phase": state.current_phase,
                "scope_root": state.scope_root,
                "framework": state.framework,
                "intent_test": state.intent_test,
                "state_file": machine.store().state_file(&scope_root),
            }))?;
            return Ok(Exit::Allowed);
        };

        let outcome = machine.transition(&mut state, target, self.evidence.clone());
        if let TransitionOutcome::PersistenceFailed { reason, .. } = &outcome {
            return Err(Error::Persistence(reason.clone()).into());
        }

        let message = outcome.message();
        if self.json {
            print_json(&json!({
                "success": outcome.is_success(),
                "from_phase": outcome.from_phase(),
                "to_phase": state.current_phase,
                "message": message,
            }))?;
        } else {
            println!("{}", message);
        }

        Ok(Exit::from_allowed(outcome.is_success()))
    }
}
