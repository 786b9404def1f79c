//! Durable per-scope workflow state
//!
//! Each scope gets `<base>/state/<hash>/state.json`, where `<hash>` is the
//! first 16 hex characters of the SHA-256 of the absolute scope path.
//! Writes go through a temp file and a rename so a crash never leaves a
//! half-written state behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use super::tdd::TddState;
use crate::{Error, Result};

const STATE_FILE: &str = "state.json";

/// Reads and writes [`TddState`] documents under a base directory
#[derive(Debug, Clone)]
pub struct StateStore {
    base_dir: PathBuf,
}

impl StateStore {
    /// Create a store rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Storage key for a scope
    pub fn scope_hash(scope_root: &Path) -> String {
        let digest = Sha256::digest(scope_root.to_string_lossy().as_bytes());
        let mut hex = format!("{:x}", digest);
        hex.truncate(16);
        hex
    }

    /// Path of the state file for a scope
    pub fn state_file(&self, scope_root: &Path) -> PathBuf {
        self.base_dir
            .join("state")
            .join(Self::scope_hash(scope_root))
            .join(STATE_FILE)
    }

    /// Load and validate the state for a scope.
    ///
    /// Returns `Ok(None)` if no state has been written. A file that does not
    /// parse, carries unknown fields, belongs to another scope or has an
    /// illegal transition log is reported as [`Error::CorruptState`].
    pub fn load_state(&self, scope_root: &Path) -> Result<Option<TddState>> {
        let path = self.state_file(scope_root);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)?;
        let corrupt = |reason: String| Error::CorruptState {
            path: path.clone(),
            reason,
        };

        let state: TddState =
            serde_json::from_str(&contents).map_err(|e| corrupt(e.to_string()))?;

        if state.scope_root != scope_root {
            return Err(corrupt(format!(
                "state belongs to {} not {}",
                state.scope_root.display(),
                scope_root.display()
            )));
        }
        state.check_history().map_err(corrupt)?;

        tracing::debug!(path = %path.display(), phase = %state.current_phase, "Loaded TDD state");
        Ok(Some(state))
    }

    /// Atomically write the state for its scope
    pub fn save_state(&self, state: &TddState) -> Result<()> {
        let path = self.state_file(&state.scope_root);
        let json = serde_json::to_string_pretty(state)?;
        atomic_write(&path, json.as_bytes())
            .map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), phase = %state.current_phase, "Saved TDD state");
        Ok(())
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Turn a user-supplied scope path into the absolute identity key.
///
/// Existing paths are canonicalized so that `.`, `..` and symlinks map to
/// the same state; missing paths are made absolute against the current
/// directory.
pub fn resolve_scope_root(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return Ok(canonical);
    }
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::tdd::{IntentTest, StateTransition, TddPhase};
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_scope_hash_shape() {
        let hash = StateStore::scope_hash(Path::new("/work/project"));
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, StateStore::scope_hash(Path::new("/work/project")));
        assert_ne!(hash, StateStore::scope_hash(Path::new("/work/project2")));
    }

    #[test]
    fn test_state_file_layout() {
        let store = StateStore::new("/base");
        let scope = Path::new("/work/project");
        let path = store.state_file(scope);
        assert_eq!(
            path,
            PathBuf::from("/base/state")
                .join(StateStore::scope_hash(scope))
                .join("state.json")
        );
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        assert!(store.load_state(Path::new("/work/project")).unwrap().is_none());
        // Loading does not create directories
        assert!(!dir.path().join("state").exists());
    }

    #[test]
    fn test_round_trip_preserves_nested_records() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());

        let mut state = TddState::new("/work/project");
        state.framework = Some("pytest".to_string());
        state.test_command = Some("pytest".to_string());
        state.intent_test = Some(IntentTest {
            file: "tests/test_calc.py".to_string(),
            name: None,
            failure_type: Some("semantic".to_string()),
            excerpt_hash: Some("0123456789abcdef".to_string()),
        });
        state.transitions.push(StateTransition {
            from_phase: TddPhase::Idle,
            to_phase: TddPhase::RedPending,
            timestamp: Utc::now(),
            evidence: None,
        });
        state.transitions.push(StateTransition {
            from_phase: TddPhase::RedPending,
            to_phase: TddPhase::RedConfirmed,
            timestamp: Utc::now(),
            evidence: Some("Test failed: pytest:semantic_fail".to_string()),
        });
        state.current_phase = TddPhase::RedConfirmed;

        store.save_state(&state).unwrap();
        let loaded = store
            .load_state(Path::new("/work/project"))
            .unwrap()
            .unwrap();

        assert_eq!(loaded.current_phase, state.current_phase);
        assert_eq!(loaded.intent_test, state.intent_test);
        assert_eq!(loaded.transitions, state.transitions);
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_minimal_document_gets_defaults() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let scope = Path::new("/work/project");
        let path = store.state_file(scope);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"scope_root": "/work/project", "current_phase": "IDLE"}"#,
        )
        .unwrap();

        let state = store.load_state(scope).unwrap().unwrap();
        assert_eq!(state.current_phase, TddPhase::Idle);
        assert!(state.framework.is_none());
        assert!(state.transitions.is_empty());
    }

    fn write_raw(store: &StateStore, scope: &Path, contents: &str) {
        let path = store.state_file(scope);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_rejects_invalid_json() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let scope = Path::new("/work/project");
        write_raw(&store, scope, "{\"scope_root\": ");
        assert!(matches!(
            store.load_state(scope),
            Err(Error::CorruptState { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_fields_and_phases() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let scope = Path::new("/work/project");

        write_raw(
            &store,
            scope,
            r#"{"scope_root": "/work/project", "current_phase": "IDLE", "extra": 1}"#,
        );
        assert!(matches!(
            store.load_state(scope),
            Err(Error::CorruptState { .. })
        ));

        write_raw(
            &store,
            scope,
            r#"{"scope_root": "/work/project", "current_phase": "BLUE"}"#,
        );
        assert!(matches!(
            store.load_state(scope),
            Err(Error::CorruptState { .. })
        ));
    }

    #[test]
    fn test_rejects_inconsistent_history() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let scope = Path::new("/work/project");
        write_raw(
            &store,
            scope,
            r#"{"scope_root": "/work/project", "current_phase": "GREEN_PENDING", "transitions": []}"#,
        );
        let err = store.load_state(scope).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_rejects_foreign_scope() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let scope = Path::new("/work/project");
        write_raw(
            &store,
            scope,
            r#"{"scope_root": "/work/elsewhere", "current_phase": "IDLE"}"#,
        );
        let err = store.load_state(scope).unwrap_err();
        assert!(err.to_string().contains("belongs to"));
    }

    #[test]
    fn test_save_overwrites_atomically() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let mut state = TddState::new("/work/project");
        store.save_state(&state).unwrap();

        state.framework = Some("cargo".to_string());
        store.save_state(&state).unwrap();

        let state_dir = store.state_file(Path::new("/work/project"));
        let entries = std::fs::read_dir(state_dir.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1, "temp files must not be left behind");

        let loaded = store.load_state(Path::new("/work/project")).unwrap().unwrap();
        assert_eq!(loaded.framework.as_deref(), Some("cargo"));
    }

    #[test]
    fn test_resolve_scope_root() {
        let dir = TempDir::new().unwrap();
        let resolved = resolve_scope_root(dir.path()).unwrap();
        assert!(resolved.is_absolute());
        assert_eq!(resolved, std::fs::canonicalize(dir.path()).unwrap());

        let dotted = dir.path().join(".");
        assert_eq!(resolve_scope_root(&dotted).unwrap(), resolved);

        let missing = Path::new("/definitely/not/here");
        assert_eq!(resolve_scope_root(missing).unwrap(), missing);
    }
}
