//! Test execution and outcome classification
//!
//! A test command is run as a child process with a wall-clock timeout and
//! its output is classified as one of:
//!
//! - `NO_TESTS`: nothing was collected
//! - `NON_SEMANTIC_FAIL`: the test could not even run (compile, import or
//!   syntax error, blocked snapshot, or an unexplained failure)
//! - `SEMANTIC_FAIL`: an assertion or expectation failed
//! - `PASS`: exit code zero
//! - `TIMEOUT`: the process was killed after the timeout
//!
//! A command that cannot be launched at all is an [`Error::Execution`], not
//! an outcome.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use super::framework::TestFramework;
use crate::{Error, Result};

/// Characters of output hashed for same-failure comparison
const EXCERPT_CHARS: usize = 4000;

/// Classification of one test execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestOutcome {
    Pass,
    SemanticFail,
    NonSemanticFail,
    NoTests,
    Timeout,
}

impl TestOutcome {
    /// Wire name (`SEMANTIC_FAIL`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            TestOutcome::Pass => "PASS",
            TestOutcome::SemanticFail => "SEMANTIC_FAIL",
            TestOutcome::NonSemanticFail => "NON_SEMANTIC_FAIL",
            TestOutcome::NoTests => "NO_TESTS",
            TestOutcome::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestOutcome {
    type Err = Error;

    /// Unrecognized outcome names are a tooling error, never mapped to
    /// pass or fail.
    fn from_str(s: &str) -> Result<Self> {
        [
            TestOutcome::Pass,
            TestOutcome::SemanticFail,
            TestOutcome::NonSemanticFail,
            TestOutcome::NoTests,
            TestOutcome::Timeout,
        ]
        .into_iter()
        .find(|o| o.as_str() == s)
        .ok_or_else(|| Error::Other(format!("Unknown test outcome: {}", s)))
    }
}

/// What the process did, before classification
#[derive(Debug, Clone, Default)]
pub struct RawExecution {
    /// Exit code; `None` when killed by timeout or a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
}

/// Runs a command line and captures its output
#[allow(async_fn_in_trait)]
pub trait TestExecutor {
    /// Execute `cmd` in `cwd`, killing it after `timeout`.
    ///
    /// Returns `Err` only if the command could not be started.
    async fn execute(&self, cmd: &[String], cwd: &Path, timeout: Duration)
        -> Result<RawExecution>;
}

/// [`TestExecutor`] backed by real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl TestExecutor for ProcessExecutor {
    async fn execute(
        &self,
        cmd: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<RawExecution> {
        let (program, args) = cmd
            .split_first()
            .ok_or_else(|| Error::Execution("Empty test command".to_string()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can take down wrappers' children
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| Error::Execution(format!("Failed to run {}: {}", program, e)))?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let start = Instant::now();
        let finished = tokio::time::timeout(timeout, async {
            let (status, out, err) = tokio::join!(
                child.wait(),
                drain(stdout_pipe, &mut stdout),
                drain(stderr_pipe, &mut stderr),
            );
            out.and(err).and(status)
        })
        .await;

        match finished {
            Ok(Ok(status)) => Ok(RawExecution {
                exit_code: status.code(),
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                duration: start.elapsed(),
                timed_out: false,
            }),
            Ok(Err(e)) => Err(Error::Execution(format!(
                "Failed to collect output of {}: {}",
                program, e
            ))),
            Err(_) => {
                tracing::warn!(command = %cmd.join(" "), ?timeout, "Test command timed out");
                terminate(&mut child).await;
                // Whatever was read before the deadline is kept
                Ok(RawExecution {
                    exit_code: None,
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    duration: start.elapsed(),
                    timed_out: true,
                })
            }
        }
    }
}

/// Append everything `reader` yields to `buf`, chunk by chunk so a
/// cancelled read keeps what already arrived.
async fn drain<R: AsyncRead + Unpin>(
    reader: Option<R>,
    buf: &mut Vec<u8>,
) -> std::io::Result<()> {
    let Some(mut reader) = reader else {
        return Ok(());
    };
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Kill a timed-out child together with its process group.
///
/// On unix the group is signalled through `kill(1)`; processes that left
/// the group (e.g. via `setsid`) survive. Elsewhere only the direct child
/// is killed.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let group = format!("-{}", pid);
        match Command::new("kill")
            .args(["-KILL", "--", group.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::debug!(pid, ?status, "Process group kill failed"),
            Err(e) => tracing::debug!(pid, error = %e, "Could not run kill"),
        }
    }
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "Child already gone");
    }
}

/// Normalized, classified result of a test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub framework: String,
    pub cmd: Vec<String>,
    pub cwd: PathBuf,
    pub timeout_s: u64,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
    pub outcome: TestOutcome,
    pub signals: Vec<String>,
    pub excerpt_hash: String,
}

impl TestResult {
    /// Comma-separated signal list for messages
    pub fn signal_summary(&self) -> String {
        self.signals.join(", ")
    }
}

/// Ordered output signatures for one framework
struct Signatures {
    /// Only consulted when the run as a whole collected nothing
    no_tests: &'static [&'static str],
    non_semantic: &'static [&'static str],
    semantic: &'static [&'static str],
    /// Marker that must also be present for a semantic failure
    fail_marker: Option<&'static str>,
}

const PYTEST: Signatures = Signatures {
    no_tests: &["collected 0 items", "no tests ran"],
    non_semantic: &[
        "SyntaxError",
        "ImportError",
        "ModuleNotFoundError",
        "ERROR collecting",
        "usage: pytest",
        "INTERNALERROR>",
    ],
    semantic: &[
        "E   AssertionError",
        "E   assert ",
        "E   Expected",
        ">       assert",
        "== FAILURES ==",
    ],
    fail_marker: Some("FAILED"),
};

const JEST: Signatures = Signatures {
    no_tests: &["No tests found", "No test files found"],
    non_semantic: &[
        "SyntaxError:",
        "Cannot find module",
        "Module not found",
        "TypeScript error",
        "Jest encountered an unexpected token",
    ],
    semantic: &["FAIL ", "●", "AssertionError", "Expected"],
    fail_marker: Some("FAIL "),
};

const GO: Signatures = Signatures {
    no_tests: &["[no test files]", "no test files"],
    non_semantic: &[
        "build failed",
        "cannot find package",
        "found packages",
        "go: downloading",
    ],
    semantic: &["--- FAIL:", "FAIL\t"],
    fail_marker: None,
};

const CARGO: Signatures = Signatures {
    no_tests: &["running 0 tests"],
    non_semantic: &[
        "error: could not compile",
        "error[E",
        "failed to run custom build command",
    ],
    semantic: &["test result: FAILED", "... FAILED", "thread '", "panicked at"],
    fail_marker: None,
};

/// A go package that ran tests, passed or failed
static GO_PACKAGE_RESULT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:ok|FAIL|--- (?:PASS|FAIL|SKIP):)\s").unwrap());

/// Per-binary test count in cargo output
static CARGO_RUNNING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^running (\d+) tests?\b").unwrap());

/// Whether a go or cargo run, which spans many packages or targets, shows
/// any test having run at all.
fn any_tests_ran(framework: TestFramework, output: &str) -> bool {
    match framework {
        TestFramework::Go => GO_PACKAGE_RESULT.is_match(output),
        TestFramework::Cargo => CARGO_RUNNING
            .captures_iter(output)
            .any(|caps| caps[1].parse::<u64>().is_ok_and(|n| n > 0)),
        TestFramework::Pytest | TestFramework::Jest | TestFramework::Vitest => false,
    }
}

/// Maps raw output to a [`TestOutcome`] plus the signals that decided it
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier {
    allow_snapshots: bool,
}

impl Classifier {
    /// Create a classifier; snapshot mismatches only count as semantic
    /// failures when `allow_snapshots` is set.
    pub fn new(allow_snapshots: bool) -> Self {
        Self { allow_snapshots }
    }

    /// Classify combined stdout/stderr for `framework`
    pub fn classify(
        &self,
        output: &str,
        exit_code: Option<i32>,
        timed_out: bool,
        framework: Option<TestFramework>,
    ) -> (TestOutcome, Vec<String>) {
        if timed_out {
            return (TestOutcome::Timeout, vec!["timeout".to_string()]);
        }

        let Some(framework) = framework else {
            return if exit_code == Some(0) {
                (TestOutcome::Pass, vec!["exit_0".to_string()])
            } else {
                (
                    TestOutcome::NonSemanticFail,
                    vec!["unknown_framework".to_string(), "non_zero_exit".to_string()],
                )
            };
        };

        let prefix = framework.name();
        let mut signals = Vec::new();

        if matches!(framework, TestFramework::Jest | TestFramework::Vitest)
            && output.contains("Snapshot")
            && (output.contains("obsolete") || output.contains("mismatch"))
        {
            if !self.allow_snapshots {
                signals.push(format!("{}:snapshot_blocked", prefix));
                return (TestOutcome::NonSemanticFail, signals);
            }
            signals.push(format!("{}:snapshot_semantic", prefix));
        }

        let sigs = match framework {
            TestFramework::Pytest => &PYTEST,
            TestFramework::Jest | TestFramework::Vitest => &JEST,
            TestFramework::Go => &GO,
            TestFramework::Cargo => &CARGO,
        };

        if !any_tests_ran(framework, output) {
            if let Some(pattern) = sigs.no_tests.iter().find(|p| output.contains(**p)) {
                signals.push(format!("{}:no_tests:{}", prefix, pattern));
                return (TestOutcome::NoTests, signals);
            }
        }

        if exit_code == Some(0) {
            signals.push(format!("{}:pass", prefix));
            return (TestOutcome::Pass, signals);
        }

        if let Some(pattern) = sigs.non_semantic.iter().find(|p| output.contains(**p)) {
            signals.push(format!("{}:non_semantic:{}", prefix, pattern));
            return (TestOutcome::NonSemanticFail, signals);
        }

        let failed = sigs.fail_marker.is_none_or(|marker| output.contains(marker));
        if failed && sigs.semantic.iter().any(|p| output.contains(*p)) {
            signals.push(format!("{}:semantic_fail", prefix));
            return (TestOutcome::SemanticFail, signals);
        }

        signals.push(format!("{}:ambiguous_fail", prefix));
        (TestOutcome::NonSemanticFail, signals)
    }
}

/// Executes test commands and classifies what happened
#[derive(Debug, Clone, Default)]
pub struct TestRunner<E = ProcessExecutor> {
    executor: E,
    classifier: Classifier,
}

impl TestRunner<ProcessExecutor> {
    /// Create a runner that spawns real processes
    pub fn new(allow_snapshots: bool) -> Self {
        Self::with_executor(ProcessExecutor, allow_snapshots)
    }
}

impl<E: TestExecutor> TestRunner<E> {
    /// Create a runner over a custom executor
    pub fn with_executor(executor: E, allow_snapshots: bool) -> Self {
        Self {
            executor,
            classifier: Classifier::new(allow_snapshots),
        }
    }

    /// Get the executor
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Run `cmd` in `cwd` and classify the result for `framework`.
    ///
    /// `framework` is a name; names that are not a known framework fall
    /// back to exit-code classification.
    pub async fn run(
        &self,
        cmd: Vec<String>,
        cwd: &Path,
        timeout: Duration,
        framework: &str,
    ) -> Result<TestResult> {
        tracing::debug!(command = %cmd.join(" "), cwd = %cwd.display(), "Running tests");

        let raw = self.executor.execute(&cmd, cwd, timeout).await?;

        let combined = format!("{}\n{}", raw.stdout, raw.stderr);
        let (outcome, signals) = self.classifier.classify(
            &combined,
            raw.exit_code,
            raw.timed_out,
            framework.parse().ok(),
        );

        tracing::info!(
            %outcome,
            exit_code = ?raw.exit_code,
            duration_ms = raw.duration.as_millis() as u64,
            "Test run classified"
        );

        Ok(TestResult {
            framework: framework.to_string(),
            cmd,
            cwd: cwd.to_path_buf(),
            timeout_s: timeout.as_secs(),
            exit_code: raw.exit_code,
            duration_ms: raw.duration.as_millis() as u64,
            stdout: raw.stdout,
            stderr: raw.stderr,
            outcome,
            signals,
            excerpt_hash: excerpt_hash(&combined),
        })
    }
}

/// Build the argv for a full-suite run (`test_file` = `None`) or a
/// single-file run.
///
/// jest and vitest drop an `npm`/`yarn` wrapper in favour of the direct
/// runner. go and cargo stay package/crate-level.
pub fn build_command(base_command: &str, framework: &str, test_file: Option<&str>) -> Vec<String> {
    let mut cmd: Vec<String> = base_command.split_whitespace().map(String::from).collect();

    let Some(test_file) = test_file else {
        return cmd;
    };

    let wrapped = cmd.iter().any(|part| part == "npm" || part == "yarn");
    match framework.parse::<TestFramework>() {
        Ok(TestFramework::Pytest) => cmd.push(test_file.to_string()),
        Ok(TestFramework::Jest) if wrapped => {
            cmd = vec!["jest".to_string(), test_file.to_string()];
        }
        Ok(TestFramework::Vitest) if wrapped => {
            cmd = vec!["vitest".to_string(), "run".to_string(), test_file.to_string()];
        }
        Ok(TestFramework::Jest | TestFramework::Vitest) => cmd.push(test_file.to_string()),
        Ok(TestFramework::Go | TestFramework::Cargo) | Err(_) => {}
    }

    tracing::debug!(command = %cmd.join(" "), "Built test command");
    cmd
}

/// Hash of the head and tail of the output, used to tell whether a later
/// failure is the same failure.
pub fn excerpt_hash(output: &str) -> String {
    let excerpt = extract_excerpt(output, EXCERPT_CHARS);
    let mut hex = format!("{:x}", Sha256::digest(excerpt.as_bytes()));
    hex.truncate(16);
    hex
}

fn extract_excerpt(output: &str, max_chars: usize) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output.to_string();
    }
    let portion = max_chars / 2;
    let head: String = output.chars().take(portion).collect();
    let tail: String = output.chars().skip(total - portion).collect();
    format!("{}\n...\n{}", head, tail)
}

/// Keep at most `limit` characters of captured output
pub fn truncate(output: &str, limit: usize) -> String {
    output.chars().take(limit).collect()
}
