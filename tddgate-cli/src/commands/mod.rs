//! CLI command implementations

pub mod can_edit;
pub mod detect;
pub mod green;
pub mod red;
pub mod run;
pub mod state;

pub use can_edit::CanEditArgs;
pub use detect::DetectArgs;
pub use green::GreenArgs;
pub use red::RedArgs;
pub use run::RunArgs;
pub use state::StateArgs;

use std::path::Path;

use tddgate_core::workflow::{resolve_scope_root, StateStore, TddStateMachine};
use tddgate_core::Config;

/// How a command finished, short of a tooling error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Operation succeeded or the transition was allowed
    Allowed,
    /// Policy said no
    Blocked,
}

impl Exit {
    pub fn code(self) -> u8 {
        match self {
            Exit::Allowed => 0,
            Exit::Blocked => 2,
        }
    }

    pub fn from_allowed(allowed: bool) -> Self {
        if allowed {
            Exit::Allowed
        } else {
            Exit::Blocked
        }
    }
}

/// State machine over the configured state directory
fn state_machine(config: &Config) -> TddStateMachine {
    TddStateMachine::new(StateStore::new(&config.state.dir))
}

/// Absolute scope root for a user-supplied path
fn scope(path: &Path) -> anyhow::Result<std::path::PathBuf> {
    Ok(resolve_scope_root(path)?)
}
