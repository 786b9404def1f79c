//! Red phase validation
//!
//! `RED_PENDING → RED_CONFIRMED` is only allowed when exactly one test file
//! has changed since the last commit and running it fails on an assertion.
//! Failures for any other reason (syntax, imports, nothing collected) leave
//! the scope in `RED_PENDING`.

use std::path::Path;
use std::time::Duration;

use serde_json::json;

use super::framework::FrameworkDetector;
use super::green::SUITE_DEFERRED;
use super::tdd::{IntentTest, TddPhase, TddState, TddStateMachine, TransitionOutcome};
use super::test_runner::{
    build_command, truncate, ProcessExecutor, TestExecutor, TestOutcome, TestRunner,
};
use super::validation::ValidationReport;
use crate::config::RunnerConfig;
use crate::git::{changed_test_files, ChangeSource, GitChanges};
use crate::{Error, Result};

/// Validates that the pending red phase has a genuinely failing test
pub struct RedValidator<E = ProcessExecutor, C = GitChanges> {
    machine: TddStateMachine,
    runner: TestRunner<E>,
    changes: C,
    timeout: Duration,
    output_limit: usize,
}

impl<E: TestExecutor, C: ChangeSource> RedValidator<E, C> {
    pub fn new(
        machine: TddStateMachine,
        runner: TestRunner<E>,
        changes: C,
        config: &RunnerConfig,
    ) -> Self {
        Self {
            machine,
            runner,
            changes,
            timeout: config.targeted_timeout,
            output_limit: config.output_limit,
        }
    }

    /// Validate the red phase for `scope_root`, transitioning to
    /// `RED_CONFIRMED` on success.
    ///
    /// Missing state, an undetectable framework, a launch failure or a
    /// failed save are errors. Everything else is a report.
    pub async fn validate(&self, scope_root: &Path) -> Result<ValidationReport> {
        let mut state = self.machine.require(scope_root)?;

        if state.current_phase != TddPhase::RedPending {
            return Ok(ValidationReport::rejected(
                state.current_phase,
                format!(
                    "Not in RED_PENDING phase (currently: {})",
                    state.current_phase
                ),
            ));
        }

        let (framework, test_command) = self.ensure_framework(&mut state)?;

        let changed = changed_test_files(&self.changes, scope_root)?;
        let intent_file = match changed.as_slice() {
            [] => {
                return Ok(ValidationReport::rejected(
                    state.current_phase,
                    "No changed test files found. Write a failing test first.",
                )
                .warning("Run: git status to see tracked files"));
            }
            [single] => single.clone(),
            many => {
                return Ok(ValidationReport::rejected(
                    state.current_phase,
                    format!("Multiple test files changed: {}", many.join(", ")),
                )
                .reason("TDD requires one test file at a time.")
                .artifact("changed_tests", many.to_vec()));
            }
        };

        let target = scope_root.join(&intent_file);
        let cmd = build_command(
            &test_command,
            &framework,
            Some(&target.to_string_lossy()),
        );
        let result = self
            .runner
            .run(cmd, scope_root, self.timeout, &framework)
            .await?;

        let stdout = truncate(&result.stdout, self.output_limit);
        let signals = result.signal_summary();

        let report = match result.outcome {
            TestOutcome::SemanticFail => {
                let intent = IntentTest {
                    file: intent_file.clone(),
                    name: None,
                    failure_type: Some("semantic".to_string()),
                    excerpt_hash: Some(result.excerpt_hash.clone()),
                };
                state.intent_test = Some(intent);

                let evidence = format!("Test failed: {}", signals);
                match self
                    .machine
                    .transition(&mut state, TddPhase::RedConfirmed, Some(evidence))
                {
                    TransitionOutcome::Transitioned { .. } => {}
                    TransitionOutcome::PersistenceFailed { reason, .. } => {
                        return Err(Error::Persistence(reason));
                    }
                    rejected @ TransitionOutcome::Rejected { .. } => {
                        return Err(Error::Other(rejected.message()));
                    }
                }

                ValidationReport::allowed(TddPhase::RedConfirmed)
                    .reason(format!(
                        "Intent test '{}' failed with semantic assertion",
                        intent_file
                    ))
                    .reason(format!("Signals: {}", signals))
                    .artifact(
                        "intent_test",
                        json!({
                            "file": intent_file,
                            "failure_type": "semantic",
                            "excerpt_hash": result.excerpt_hash,
                        }),
                    )
                    .artifact("test_output", stdout)
                    .artifact("exit_code", result.exit_code)
            }
            TestOutcome::NoTests => ValidationReport::rejected(
                state.current_phase,
                format!("No tests found in '{}'", intent_file),
            )
            .reason("Test file exists but contains no executable tests.")
            .reason(format!("Signals: {}", signals))
            .warning("Check test file syntax and framework configuration")
            .artifact("test_output", stdout)
            .artifact("signals", result.signals.clone()),
            TestOutcome::NonSemanticFail => ValidationReport::rejected(
                state.current_phase,
                "Test failed but NOT with semantic assertion",
            )
            .reason("Detected: compile error, import error, or syntax error")
            .reason(format!("Signals: {}", signals))
            .reason("Fix the test to compile and run, then fail with assertion.")
            .artifact("test_output", stdout)
            .artifact("stderr", truncate(&result.stderr, self.output_limit))
            .artifact("signals", result.signals.clone()),
            TestOutcome::Pass => ValidationReport::rejected(
                state.current_phase,
                format!("Test '{}' PASSED (expected failure)", intent_file),
            )
            .reason("RED phase requires a failing test.")
            .reason("Write an assertion that exposes missing functionality.")
            .artifact("test_output", stdout)
            .artifact("signals", result.signals.clone()),
            TestOutcome::Timeout => ValidationReport::rejected(
                state.current_phase,
                format!("Test execution timed out (>{}s)", result.timeout_s),
            )
            .reason("Infinite loop or very slow test detected.")
            .warning("Optimize test or increase timeout")
            .artifact("timeout_s", result.timeout_s)
            .artifact("test_output", stdout)
            .artifact("stderr", truncate(&result.stderr, self.output_limit)),
        };

        Ok(with_deferred_suite_warning(report, &state))
    }

    /// Framework name and suite command, detecting and persisting them on
    /// first use.
    fn ensure_framework(&self, state: &mut TddState) -> Result<(String, String)> {
        if let (Some(framework), Some(command)) = (&state.framework, &state.test_command) {
            return Ok((framework.clone(), command.clone()));
        }

        let info = FrameworkDetector::new(&state.scope_root)
            .detect()
            .ok_or_else(|| {
                Error::Config(format!(
                    "No testing framework detected in {}",
                    state.scope_root.display()
                ))
            })?;

        tracing::info!(
            framework = %info.name,
            source = %info.config_source,
            "Detected test framework"
        );

        state.framework = Some(info.name.to_string());
        state.test_command = Some(info.test_command.clone());
        self.machine.save(state)?;

        Ok((info.name.to_string(), info.test_command))
    }
}

/// Surface a suite that was deferred when the previous green was confirmed
fn with_deferred_suite_warning(report: ValidationReport, state: &TddState) -> ValidationReport {
    let deferred = state
        .last_transition_to(TddPhase::GreenConfirmed)
        .and_then(|t| t.evidence.as_deref())
        .is_some_and(|evidence| evidence.contains(SUITE_DEFERRED));

    if deferred {
        tracing::warn!("Previous green phase deferred the full test suite");
        report.warning("Previous GREEN_CONFIRMED deferred the full suite; run it to rule out regressions")
    } else {
        report
    }
}
