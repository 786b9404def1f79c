//! Result record returned by the phase validators

use serde::Serialize;
use serde_json::{Map, Value};

use super::tdd::TddPhase;

/// Outcome of validating a phase transition
///
/// `allowed = false` is a policy rejection, not an error: `reasons` says
/// why and what to do about it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Whether the transition was allowed and recorded
    pub allowed: bool,
    /// Phase after validation
    pub phase: TddPhase,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
    /// Supporting data: intent test, truncated output, signals, timings
    pub artifacts: Map<String, Value>,
}

impl ValidationReport {
    /// An allowed transition that landed in `phase`
    pub fn allowed(phase: TddPhase) -> Self {
        Self {
            allowed: true,
            phase,
            reasons: Vec::new(),
            warnings: Vec::new(),
            artifacts: Map::new(),
        }
    }

    /// A rejection that leaves the scope in `phase`
    pub fn rejected(phase: TddPhase, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            phase,
            reasons: vec![reason.into()],
            warnings: Vec::new(),
            artifacts: Map::new(),
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }

    pub fn warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn artifact(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.artifacts.insert(key.to_string(), value.into());
        self
    }

    /// Process exit code: 0 allowed, 2 blocked
    pub fn exit_code(&self) -> u8 {
        if self.allowed {
            0
        } else {
            2
        }
    }
}
