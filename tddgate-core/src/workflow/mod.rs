//! Workflow module for enforcing the Red-Green-Refactor discipline
//!
//! This module provides the TDD state machine, its durable store, test
//! framework detection, test execution and the phase validators that gate
//! the evidence-backed transitions.

pub mod framework;
pub mod green;
pub mod red;
pub mod store;
pub mod tdd;
pub mod test_runner;
pub mod validation;

pub use framework::{detect_scope_root, FrameworkDetector, FrameworkInfo, TestFramework};
pub use green::GreenValidator;
pub use red::RedValidator;
pub use store::{resolve_scope_root, StateStore};
pub use tdd::{
    EditType, IntentTest, StateTransition, TddPhase, TddState, TddStateMachine, TransitionOutcome,
};
pub use test_runner::{
    build_command, excerpt_hash, ProcessExecutor, RawExecution, TestExecutor, TestOutcome,
    TestResult, TestRunner,
};
pub use validation::ValidationReport;
