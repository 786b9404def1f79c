//! Test framework detection
//!
//! Detection is CI-first:
//! 1. CI configuration (GitHub Actions, GitLab CI, CircleCI)
//! 2. Package manifests (pyproject.toml, package.json, go.mod, Cargo.toml)
//! 3. Framework config files (pytest.ini, jest.config.js, ...)
//!
//! The first match wins. Nothing matching anywhere is "not found"; there is
//! no default framework.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Supported test frameworks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestFramework {
    /// Python pytest
    Pytest,
    /// JavaScript Jest
    Jest,
    /// JavaScript Vitest
    Vitest,
    /// Go test
    Go,
    /// Rust/Cargo test runner
    Cargo,
}

impl TestFramework {
    /// Every framework, in CI matching order
    pub const ALL: [TestFramework; 5] = [
        TestFramework::Pytest,
        TestFramework::Jest,
        TestFramework::Vitest,
        TestFramework::Go,
        TestFramework::Cargo,
    ];

    /// Get the name of the framework
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pytest => "pytest",
            Self::Jest => "jest",
            Self::Vitest => "vitest",
            Self::Go => "go",
            Self::Cargo => "cargo",
        }
    }

    /// Command that runs the whole suite
    pub fn test_command(&self) -> &'static str {
        match self {
            Self::Pytest => "pytest",
            Self::Jest => "npm test",
            Self::Vitest => "vitest run",
            Self::Go => "go test ./...",
            Self::Cargo => "cargo test",
        }
    }

    /// Command template for a single file; `{test_file}` is substituted
    pub fn targeted_template(&self) -> &'static str {
        match self {
            Self::Pytest => "pytest {test_file}",
            Self::Jest => "jest {test_file}",
            Self::Vitest => "vitest run {test_file}",
            Self::Go => "go test {test_file}",
            Self::Cargo => "cargo test --test {test_file}",
        }
    }

    /// Describe this framework as found in `config_source`
    pub fn info(&self, config_source: impl Into<String>) -> FrameworkInfo {
        FrameworkInfo {
            name: *self,
            test_command: self.test_command().to_string(),
            targeted_template: self.targeted_template().to_string(),
            config_source: config_source.into(),
        }
    }
}

impl fmt::Display for TestFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TestFramework {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TestFramework::ALL
            .into_iter()
            .find(|fw| fw.name() == s)
            .ok_or_else(|| Error::Config(format!("Unknown test framework: {}", s)))
    }
}

/// Detection result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkInfo {
    /// Which framework governs the scope
    pub name: TestFramework,
    /// Full-suite command
    pub test_command: String,
    /// Single-file command template with a `{test_file}` placeholder
    pub targeted_template: String,
    /// Where the detection came from, for diagnostics
    pub config_source: String,
}

impl FrameworkInfo {
    /// Fill the targeted template for one file
    pub fn targeted_command(&self, test_file: &str) -> String {
        self.targeted_template.replace("{test_file}", test_file)
    }
}

/// Command signatures looked for on CI `run:`/`script:` lines
static CI_SIGNATURES: LazyLock<Vec<(TestFramework, Regex)>> = LazyLock::new(|| {
    let patterns: [(TestFramework, &[&str]); 5] = [
        (TestFramework::Pytest, &[r"pytest", r"py\.test", r"python -m pytest"]),
        (TestFramework::Jest, &[r"jest", r"npm (?:run )?test", r"yarn test"]),
        (TestFramework::Vitest, &[r"vitest", r"npm (?:run )?vitest", r"yarn vitest"]),
        (TestFramework::Go, &[r"go test"]),
        (TestFramework::Cargo, &[r"cargo test"]),
    ];
    patterns
        .into_iter()
        .map(|(fw, alternatives)| {
            let regex = RegexBuilder::new(&alternatives.join("|"))
                .case_insensitive(true)
                .build()
                .unwrap();
            (fw, regex)
        })
        .collect()
});

const CI_FILES: [&str; 2] = [".gitlab-ci.yml", ".circleci/config.yml"];

const PYTEST_CONFIGS: [&str; 4] = ["pytest.ini", "pyproject.toml", "tox.ini", "setup.cfg"];
const JEST_CONFIGS: [&str; 3] = ["jest.config.js", "jest.config.ts", "jest.config.json"];
const VITEST_CONFIGS: [&str; 2] = ["vitest.config.js", "vitest.config.ts"];

const SCOPE_MANIFESTS: [&str; 8] = [
    "pyproject.toml",
    "setup.py",
    "package.json",
    "go.mod",
    "Cargo.toml",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
];

/// Auto-detects the test framework for a scope
#[derive(Debug, Clone)]
pub struct FrameworkDetector {
    scope_root: PathBuf,
}

impl FrameworkDetector {
    /// Create a detector for the given scope root
    pub fn new(scope_root: impl Into<PathBuf>) -> Self {
        Self {
            scope_root: scope_root.into(),
        }
    }

    /// Run the detection cascade
    pub fn detect(&self) -> Option<FrameworkInfo> {
        let found = self
            .detect_from_ci()
            .or_else(|| self.detect_from_manifests())
            .or_else(|| self.detect_from_configs());

        match &found {
            Some(info) => tracing::debug!(
                framework = %info.name,
                source = %info.config_source,
                "Detected test framework"
            ),
            None => tracing::debug!(
                scope_root = %self.scope_root.display(),
                "No test framework detected"
            ),
        }
        found
    }

    /// Workflow and pipeline files, in a stable order
    fn ci_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let workflows = self.scope_root.join(".github").join("workflows");
        if let Ok(entries) = std::fs::read_dir(&workflows) {
            let mut found: Vec<PathBuf> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| {
                    p.is_file()
                        && matches!(
                            p.extension().and_then(|e| e.to_str()),
                            Some("yml") | Some("yaml")
                        )
                })
                .collect();
            found.sort();
            files.extend(found);
        }

        files.extend(
            CI_FILES
                .iter()
                .map(|f| self.scope_root.join(f))
                .filter(|p| p.is_file()),
        );
        files
    }

    fn detect_from_ci(&self) -> Option<FrameworkInfo> {
        for ci_file in self.ci_files() {
            let content = match std::fs::read_to_string(&ci_file) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(file = %ci_file.display(), error = %e, "Skipping unreadable CI file");
                    continue;
                }
            };

            let file_name = ci_file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            for line in content.lines() {
                if !(line.contains("run:") || line.contains("script:")) {
                    continue;
                }
                if let Some((fw, _)) = CI_SIGNATURES.iter().find(|(_, re)| re.is_match(line)) {
                    return Some(fw.info(format!("CI:{}", file_name)));
                }
            }
        }
        None
    }

    fn read(&self, file: &str) -> Option<String> {
        let path = self.scope_root.join(file);
        if !path.is_file() {
            return None;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Skipping unreadable manifest");
                None
            }
        }
    }

    fn detect_from_manifests(&self) -> Option<FrameworkInfo> {
        if let Some(content) = self.read("pyproject.toml") {
            if content.contains("pytest") {
                return Some(TestFramework::Pytest.info("pyproject.toml"));
            }
        }

        if let Some(fw) = self.read("package.json").and_then(|c| js_framework(&c)) {
            return Some(fw.info("package.json"));
        }

        if self.scope_root.join("go.mod").is_file() {
            return Some(TestFramework::Go.info("go.mod"));
        }

        if self.scope_root.join("Cargo.toml").is_file() {
            return Some(TestFramework::Cargo.info("Cargo.toml"));
        }

        None
    }

    fn detect_from_configs(&self) -> Option<FrameworkInfo> {
        let groups: [(TestFramework, &[&str]); 3] = [
            (TestFramework::Pytest, &PYTEST_CONFIGS),
            (TestFramework::Jest, &JEST_CONFIGS),
            (TestFramework::Vitest, &VITEST_CONFIGS),
        ];

        groups.into_iter().find_map(|(fw, configs)| {
            configs
                .iter()
                .find(|c| self.scope_root.join(c).exists())
                .map(|c| fw.info(*c))
        })
    }
}

/// Pick jest or vitest from package.json `scripts.test` / `devDependencies`
fn js_framework(package_json: &str) -> Option<TestFramework> {
    let data: serde_json::Value = match serde_json::from_str(package_json) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unparseable package.json");
            return None;
        }
    };

    let test_script = data
        .pointer("/scripts/test")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let dev_dep = |name: &str| {
        data.get("devDependencies")
            .and_then(|d| d.get(name))
            .is_some()
    };

    if test_script.contains("jest") || dev_dep("jest") {
        return Some(TestFramework::Jest);
    }
    if test_script.contains("vitest") || dev_dep("vitest") {
        return Some(TestFramework::Vitest);
    }
    None
}

/// Find the nearest enclosing project directory.
///
/// Walks upward from `start` and returns the first directory containing a
/// known manifest or a `.git` directory.
pub fn detect_scope_root(start: &Path) -> Option<PathBuf> {
    let start = std::fs::canonicalize(start).ok()?;
    start
        .ancestors()
        .find(|dir| {
            SCOPE_MANIFESTS.iter().any(|m| dir.join(m).exists()) || dir.join(".git").exists()
        })
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, contents: &str) {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn detect(dir: &TempDir) -> Option<FrameworkInfo> {
        FrameworkDetector::new(dir.path()).detect()
    }

    #[test]
    fn test_detect_no_framework() {
        let dir = TempDir::new().unwrap();
        assert_eq!(detect(&dir), None);
    }

    #[test]
    fn test_detect_from_github_workflow() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            ".github/workflows/ci.yml",
            "jobs:\n  test:\n    steps:\n      - run: python -m pytest -q\n",
        );
        let info = detect(&dir).unwrap();
        assert_eq!(info.name, TestFramework::Pytest);
        assert_eq!(info.config_source, "CI:ci.yml");
        assert_eq!(info.test_command, "pytest");
        assert_eq!(info.targeted_template, "pytest {test_file}");
    }

    #[test]
    fn test_ci_only_considers_command_lines() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            ".gitlab-ci.yml",
            "# we used to use jest here\ntest:\n  script: go test ./...\n",
        );
        let info = detect(&dir).unwrap();
        assert_eq!(info.name, TestFramework::Go);
        assert_eq!(info.config_source, "CI:.gitlab-ci.yml");
    }

    #[test]
    fn test_ci_beats_manifest() {
        let dir = TempDir::new().unwrap();
        write(&dir, "Cargo.toml", "[package]");
        write(&dir, ".github/workflows/test.yaml", "      - run: npm run test\n");
        let info = detect(&dir).unwrap();
        assert_eq!(info.name, TestFramework::Jest);
        assert_eq!(info.test_command, "npm test");
    }

    #[test]
    fn test_ci_match_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        write(&dir, ".circleci/config.yml", "  - run: CARGO TEST --all\n");
        assert_eq!(detect(&dir).unwrap().name, TestFramework::Cargo);
    }

    #[test]
    fn test_detect_pytest_from_pyproject() {
        let dir = TempDir::new().unwrap();
        write(&dir, "pyproject.toml", "[tool.pytest.ini_options]\n");
        let info = detect(&dir).unwrap();
        assert_eq!(info.name, TestFramework::Pytest);
        assert_eq!(info.config_source, "pyproject.toml");
    }

    #[test]
    fn test_detect_jest_from_package_json() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "package.json",
            r#"{"devDependencies": {"jest": "^29.0.0"}}"#,
        );
        let info = detect(&dir).unwrap();
        assert_eq!(info.name, TestFramework::Jest);
        assert_eq!(info.config_source, "package.json");
    }

    #[test]
    fn test_detect_vitest_from_test_script() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "package.json",
            r#"{"scripts": {"test": "vitest run --coverage"}}"#,
        );
        let info = detect(&dir).unwrap();
        assert_eq!(info.name, TestFramework::Vitest);
        assert_eq!(info.test_command, "vitest run");
    }

    #[test]
    fn test_package_json_without_runner_falls_through() {
        let dir = TempDir::new().unwrap();
        write(&dir, "package.json", r#"{"scripts": {"test": "node t.js"}}"#);
        assert_eq!(detect(&dir), None);

        write(&dir, "jest.config.ts", "export default {}");
        let info = detect(&dir).unwrap();
        assert_eq!(info.name, TestFramework::Jest);
        assert_eq!(info.config_source, "jest.config.ts");
    }

    #[test]
    fn test_detect_go_and_cargo_manifests() {
        let dir = TempDir::new().unwrap();
        write(&dir, "go.mod", "module example.com/m");
        assert_eq!(detect(&dir).unwrap().name, TestFramework::Go);

        let dir = TempDir::new().unwrap();
        write(&dir, "Cargo.toml", "[package]");
        let info = detect(&dir).unwrap();
        assert_eq!(info.name, TestFramework::Cargo);
        assert_eq!(info.targeted_template, "cargo test --test {test_file}");
    }

    #[test]
    fn test_pyproject_without_pytest_uses_config_fallback() {
        let dir = TempDir::new().unwrap();
        write(&dir, "pyproject.toml", "[project]\nname = \"x\"\n");
        let info = detect(&dir).unwrap();
        assert_eq!(info.name, TestFramework::Pytest);
        assert_eq!(info.config_source, "pyproject.toml");
    }

    #[test]
    fn test_detect_vitest_config() {
        let dir = TempDir::new().unwrap();
        write(&dir, "vitest.config.ts", "export default {}");
        assert_eq!(detect(&dir).unwrap().name, TestFramework::Vitest);
    }

    #[test]
    fn test_targeted_command() {
        let info = TestFramework::Vitest.info("package.json");
        assert_eq!(
            info.targeted_command("src/a.test.ts"),
            "vitest run src/a.test.ts"
        );
    }

    #[test]
    fn test_framework_from_str() {
        assert_eq!("go".parse::<TestFramework>().unwrap(), TestFramework::Go);
        assert!("mocha".parse::<TestFramework>().is_err());
    }

    #[test]
    fn test_detect_scope_root_finds_manifest() {
        let dir = TempDir::new().unwrap();
        write(&dir, "package.json", "{}");
        write(&dir, "src/lib/deep/file.js", "");
        let root = detect_scope_root(&dir.path().join("src/lib/deep")).unwrap();
        assert_eq!(root, fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_detect_scope_root_stops_at_git_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("repo/.git")).unwrap();
        fs::create_dir_all(dir.path().join("repo/sub")).unwrap();
        let root = detect_scope_root(&dir.path().join("repo/sub")).unwrap();
        assert_eq!(root, fs::canonicalize(dir.path().join("repo")).unwrap());
    }

    #[test]
    fn test_detect_scope_root_missing_start() {
        assert_eq!(detect_scope_root(Path::new("/definitely/not/here")), None);
    }
}
