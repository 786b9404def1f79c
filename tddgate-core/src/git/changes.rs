//! Changed-file discovery for a scope

use std::path::Path;

use super::repo::GitRepo;
use crate::Result;

/// Path fragments that mark a file as a test
const TEST_MARKERS: &[&str] = &["test_", "_test.", ".test.", ".spec.", "/tests/", "/__tests__/"];

/// Source of files changed since the last commit
pub trait ChangeSource {
    /// Changed files under `scope_root`, relative to it, sorted
    fn changed_files(&self, scope_root: &Path) -> Result<Vec<String>>;
}

/// [`ChangeSource`] backed by the git repository containing the scope
#[derive(Debug, Clone, Copy, Default)]
pub struct GitChanges {
    include_untracked: bool,
}

impl GitChanges {
    pub fn new(include_untracked: bool) -> Self {
        Self { include_untracked }
    }
}

impl ChangeSource for GitChanges {
    fn changed_files(&self, scope_root: &Path) -> Result<Vec<String>> {
        let repo = GitRepo::open(scope_root)?;
        let mut files: Vec<String> = repo
            .changed_files(self.include_untracked)?
            .into_iter()
            .filter_map(|path| {
                path.strip_prefix(scope_root)
                    .ok()
                    .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }
}

/// Whether a path looks like a test file
pub fn is_test_path(path: &str) -> bool {
    let anchored = format!("/{}", path);
    TEST_MARKERS.iter().any(|marker| anchored.contains(marker))
}

/// Changed files under the scope that look like tests
pub fn changed_test_files(source: &impl ChangeSource, scope_root: &Path) -> Result<Vec<String>> {
    let tests: Vec<String> = source
        .changed_files(scope_root)?
        .into_iter()
        .filter(|path| is_test_path(path))
        .collect();
    tracing::debug!(count = tests.len(), "Changed test files");
    Ok(tests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::repo::tests::{commit, init_repo, stage, write};

    #[test]
    fn test_is_test_path() {
        assert!(is_test_path("tests/test_calc.py"));
        assert!(is_test_path("test_calc.py"));
        assert!(is_test_path("pkg/calc_test.go"));
        assert!(is_test_path("src/sum.test.ts"));
        assert!(is_test_path("src/sum.spec.js"));
        assert!(is_test_path("tests/api.rs"));
        assert!(is_test_path("src/__tests__/sum.js"));
        assert!(is_test_path("__tests__/sum.js"));

        assert!(!is_test_path("src/calc.py"));
        assert!(!is_test_path("src/testing.rs"));
        assert!(!is_test_path("README.md"));
    }

    #[test]
    fn test_git_changes_relative_to_scope() {
        let (dir, raw) = init_repo();
        write(dir.path(), "app/calc.py", "");
        write(dir.path(), "other/test_other.py", "");
        commit(&raw, &["app/calc.py", "other/test_other.py"]);

        write(dir.path(), "app/calc.py", "x = 1\n");
        write(dir.path(), "app/tests/test_calc.py", "");
        write(dir.path(), "other/test_other.py", "x = 2\n");
        stage(&raw, &["app/tests/test_calc.py"]);

        let scope = std::fs::canonicalize(dir.path().join("app")).unwrap();
        let files = GitChanges::new(false).changed_files(&scope).unwrap();
        assert_eq!(files, vec!["calc.py", "tests/test_calc.py"]);

        let tests = changed_test_files(&GitChanges::default(), &scope).unwrap();
        assert_eq!(tests, vec!["tests/test_calc.py"]);
    }

    #[test]
    fn test_git_changes_outside_repo_is_error() {
        let plain = tempfile::TempDir::new().unwrap();
        assert!(GitChanges::default().changed_files(plain.path()).is_err());
    }
}
