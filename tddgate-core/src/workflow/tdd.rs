//! Test-Driven Development state machine
//!
//! A scope moves through the Red-Green-Refactor cycle:
//!
//! ```text
//! IDLE → RED_PENDING → RED_CONFIRMED → GREEN_PENDING →
//! GREEN_CONFIRMED → REFACTOR_PENDING → REFACTOR_COMPLETE → IDLE | RED_PENDING
//! ```
//!
//! Every phase change goes through [`TddStateMachine::transition`], which
//! consults the static transition graph, appends an audit record and
//! persists the whole state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::store::StateStore;
use crate::{Error, Result};

/// The current phase of the TDD cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TddPhase {
    /// No cycle in progress
    Idle,
    /// Writing a failing test
    RedPending,
    /// A test fails for the right reason
    RedConfirmed,
    /// Implementing to make the intent test pass
    GreenPending,
    /// Intent test (and suite) pass
    GreenConfirmed,
    /// Cleaning up while keeping tests green
    RefactorPending,
    /// Refactoring finished
    RefactorComplete,
}

impl TddPhase {
    /// Every phase, in cycle order
    pub const ALL: [TddPhase; 7] = [
        TddPhase::Idle,
        TddPhase::RedPending,
        TddPhase::RedConfirmed,
        TddPhase::GreenPending,
        TddPhase::GreenConfirmed,
        TddPhase::RefactorPending,
        TddPhase::RefactorComplete,
    ];

    /// Phases reachable in one step from this one
    pub fn valid_transitions(&self) -> &'static [TddPhase] {
        match self {
            TddPhase::Idle => &[TddPhase::RedPending],
            TddPhase::RedPending => &[TddPhase::RedConfirmed, TddPhase::Idle],
            TddPhase::RedConfirmed => &[TddPhase::GreenPending],
            TddPhase::GreenPending => &[TddPhase::GreenConfirmed, TddPhase::RedPending],
            TddPhase::GreenConfirmed => &[TddPhase::RefactorPending, TddPhase::Idle],
            TddPhase::RefactorPending => &[TddPhase::RefactorComplete, TddPhase::GreenPending],
            TddPhase::RefactorComplete => &[TddPhase::Idle, TddPhase::RedPending],
        }
    }

    /// Check if a transition to the given phase is allowed
    pub fn can_transition_to(&self, to: &TddPhase) -> bool {
        self.valid_transitions().contains(to)
    }

    /// Production code may only change while a failing test must be made to
    /// pass, or during refactor cleanup after green.
    pub fn can_edit_production(&self) -> bool {
        matches!(self, TddPhase::GreenPending | TddPhase::RefactorPending)
    }

    /// Tests may get stricter during red and refactor, and anything but
    /// weaker during green. All other phases freeze tests.
    pub fn can_edit_test(&self, edit: EditType) -> bool {
        match self {
            TddPhase::RedPending | TddPhase::RefactorPending => {
                matches!(edit, EditType::Modify | EditType::Strengthen)
            }
            TddPhase::GreenPending => edit != EditType::Weaken,
            _ => false,
        }
    }

    /// Wire name (`RED_PENDING`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            TddPhase::Idle => "IDLE",
            TddPhase::RedPending => "RED_PENDING",
            TddPhase::RedConfirmed => "RED_CONFIRMED",
            TddPhase::GreenPending => "GREEN_PENDING",
            TddPhase::GreenConfirmed => "GREEN_CONFIRMED",
            TddPhase::RefactorPending => "REFACTOR_PENDING",
            TddPhase::RefactorComplete => "REFACTOR_COMPLETE",
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            TddPhase::Idle => "No TDD cycle in progress",
            TddPhase::RedPending => "Writing failing test",
            TddPhase::RedConfirmed => "Failing test confirmed",
            TddPhase::GreenPending => "Implementing to pass test",
            TddPhase::GreenConfirmed => "Tests passing",
            TddPhase::RefactorPending => "Refactoring while keeping tests green",
            TddPhase::RefactorComplete => "Refactor complete",
        }
    }
}

impl fmt::Display for TddPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TddPhase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TddPhase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| Error::InvalidPhase(s.to_string()))
    }
}

/// Kind of change proposed to a test file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditType {
    /// Neutral change
    Modify,
    /// Makes assertions stricter
    Strengthen,
    /// Loosens or removes assertions
    Weaken,
}

impl FromStr for EditType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "modify" => Ok(EditType::Modify),
            "strengthen" => Ok(EditType::Strengthen),
            "weaken" => Ok(EditType::Weaken),
            other => Err(Error::Other(format!(
                "Invalid edit type: {} (expected modify, strengthen or weaken)",
                other
            ))),
        }
    }
}

/// The test that defines the current unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentTest {
    /// Test file, relative to the scope root
    pub file: String,
    /// Test name within the file (file-level targeting leaves this empty)
    #[serde(default)]
    pub name: Option<String>,
    /// How the test failed when red was confirmed (e.g. "semantic")
    #[serde(default)]
    pub failure_type: Option<String>,
    /// Hash of the failure excerpt, for same-failure comparison
    #[serde(default)]
    pub excerpt_hash: Option<String>,
}

/// An applied phase change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateTransition {
    /// Phase we transitioned from
    pub from_phase: TddPhase,
    /// Phase we transitioned to
    pub to_phase: TddPhase,
    /// When the transition was recorded
    pub timestamp: DateTime<Utc>,
    /// Justification attached to the transition
    #[serde(default)]
    pub evidence: Option<String>,
}

/// Workflow state for one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TddState {
    /// Absolute path of the scope; identity key
    pub scope_root: PathBuf,
    /// Active phase
    pub current_phase: TddPhase,
    /// Detected framework name, cached by the first red validation
    #[serde(default)]
    pub framework: Option<String>,
    /// Full-suite command for the framework
    #[serde(default)]
    pub test_command: Option<String>,
    /// Test driving the current cycle
    #[serde(default)]
    pub intent_test: Option<IntentTest>,
    /// Audit trail of applied transitions
    #[serde(default)]
    pub transitions: Vec<StateTransition>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl TddState {
    /// Create a fresh state in `IDLE`
    pub fn new(scope_root: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            scope_root: scope_root.into(),
            current_phase: TddPhase::Idle,
            framework: None,
            test_command: None,
            intent_test: None,
            transitions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Most recent transition into `phase`, if any
    pub fn last_transition_to(&self, phase: TddPhase) -> Option<&StateTransition> {
        self.transitions.iter().rev().find(|t| t.to_phase == phase)
    }

    /// Check that the transition log is a legal walk from `IDLE` that ends
    /// at `current_phase`.
    pub fn check_history(&self) -> std::result::Result<(), String> {
        let mut phase = TddPhase::Idle;
        for (i, t) in self.transitions.iter().enumerate() {
            if t.from_phase != phase {
                return Err(format!(
                    "transition {} starts at {} but the previous phase was {}",
                    i, t.from_phase, phase
                ));
            }
            if !phase.can_transition_to(&t.to_phase) {
                return Err(format!(
                    "transition {} ({} → {}) is not allowed",
                    i, t.from_phase, t.to_phase
                ));
            }
            phase = t.to_phase;
        }
        if phase != self.current_phase {
            return Err(format!(
                "current phase {} does not match last recorded phase {}",
                self.current_phase, phase
            ));
        }
        Ok(())
    }
}

/// Result of a requested phase change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Transition recorded and persisted
    Transitioned { from: TddPhase, to: TddPhase },
    /// Not in the transition graph; state untouched
    Rejected { from: TddPhase, to: TddPhase },
    /// Phase advanced in memory but the durable copy is stale
    PersistenceFailed {
        from: TddPhase,
        to: TddPhase,
        reason: String,
    },
}

impl TransitionOutcome {
    /// Whether the transition was applied and saved
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionOutcome::Transitioned { .. })
    }

    /// Phase the request started from
    pub fn from_phase(&self) -> TddPhase {
        match self {
            TransitionOutcome::Transitioned { from, .. }
            | TransitionOutcome::Rejected { from, .. }
            | TransitionOutcome::PersistenceFailed { from, .. } => *from,
        }
    }

    /// Human-readable result
    pub fn message(&self) -> String {
        match self {
            TransitionOutcome::Transitioned { from, to } => {
                format!("Transitioned: {} → {}", from, to)
            }
            TransitionOutcome::Rejected { from, to } => {
                format!(
                    "Invalid transition: {} → {} (allowed from {}: {})",
                    from,
                    to,
                    from,
                    join_phases(from.valid_transitions())
                )
            }
            TransitionOutcome::PersistenceFailed { reason, .. } => {
                format!("Failed to save state: {}", reason)
            }
        }
    }
}

fn join_phases(phases: &[TddPhase]) -> String {
    phases
        .iter()
        .map(TddPhase::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Gatekeeper for every phase change of a scope
#[derive(Debug, Clone)]
pub struct TddStateMachine {
    store: StateStore,
}

impl TddStateMachine {
    /// Create a state machine persisting through `store`
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Get the backing store
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Pure membership check against the transition graph
    pub fn can_transition(from: TddPhase, to: TddPhase) -> bool {
        from.can_transition_to(&to)
    }

    /// Start a new workflow for `scope_root` in `IDLE`, replacing any
    /// existing state.
    pub fn init(&self, scope_root: &Path) -> Result<TddState> {
        let mut state = TddState::new(scope_root);
        self.save(&mut state)?;
        tracing::info!(scope_root = %scope_root.display(), "Initialized TDD state");
        Ok(state)
    }

    /// Load the state for a scope, if one exists
    pub fn load(&self, scope_root: &Path) -> Result<Option<TddState>> {
        self.store.load_state(scope_root)
    }

    /// Load the state for a scope, failing if none exists
    pub fn require(&self, scope_root: &Path) -> Result<TddState> {
        self.load(scope_root)?.ok_or_else(|| Error::NoState {
            scope_root: scope_root.to_path_buf(),
        })
    }

    /// Persist the state, bumping `updated_at`
    pub fn save(&self, state: &mut TddState) -> Result<()> {
        state.updated_at = Utc::now();
        self.store.save_state(state)
    }

    /// Attempt a phase change.
    ///
    /// On rejection nothing is recorded. On persistence failure the
    /// in-memory state has already advanced; callers must not assume it
    /// is durable.
    pub fn transition(
        &self,
        state: &mut TddState,
        to: TddPhase,
        evidence: Option<String>,
    ) -> TransitionOutcome {
        let from = state.current_phase;

        if !Self::can_transition(from, to) {
            tracing::debug!(%from, %to, "Rejected phase transition");
            return TransitionOutcome::Rejected { from, to };
        }

        state.transitions.push(StateTransition {
            from_phase: from,
            to_phase: to,
            timestamp: Utc::now(),
            evidence,
        });
        state.current_phase = to;
        // A new red cycle starts without an intent test
        if to == TddPhase::RedPending {
            state.intent_test = None;
        }

        if let Err(e) = self.save(state) {
            tracing::warn!(%from, %to, error = %e, "Phase advanced but state was not saved");
            return TransitionOutcome::PersistenceFailed {
                from,
                to,
                reason: e.to_string(),
            };
        }

        tracing::info!(
            scope_root = %state.scope_root.display(),
            %from,
            %to,
            "TDD phase transition"
        );
        TransitionOutcome::Transitioned { from, to }
    }
}
