//! Configuration management for tddgate
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (TDDGATE_*)
//! 3. Config file (~/.config/tddgate/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Where per-scope workflow state is kept
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    /// Base directory; states live under `<dir>/state/<scope hash>/state.json`
    pub dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".sc-tdd"),
        }
    }
}

/// Test execution settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Timeout for a single-file (targeted) run
    #[serde(with = "humantime_serde")]
    pub targeted_timeout: Duration,

    /// Timeout for a full-suite run
    #[serde(with = "humantime_serde")]
    pub suite_timeout: Duration,

    /// Maximum characters of captured output kept in reports
    pub output_limit: usize,

    /// Treat snapshot mismatches as semantic failures
    pub allow_snapshots: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            targeted_timeout: Duration::from_secs(120),
            suite_timeout: Duration::from_secs(300),
            output_limit: 2000,
            allow_snapshots: false,
        }
    }
}

/// Version-control settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitConfig {
    /// Count untracked files as changed when looking for the intent test
    pub include_untracked: bool,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// State storage configuration
    pub state: StateConfig,

    /// Test runner configuration
    pub runner: RunnerConfig,

    /// Git configuration
    pub git: GitConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/tddgate/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tddgate").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - TDDGATE_STATE_DIR: Base directory for state files
    /// - TDDGATE_ALLOW_SNAPSHOTS: `1`/`true` to allow snapshot failures
    /// - TDDGATE_INCLUDE_UNTRACKED: `1`/`true` to count untracked files
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("TDDGATE_STATE_DIR") {
            self.state.dir = PathBuf::from(dir);
        }

        if let Ok(value) = std::env::var("TDDGATE_ALLOW_SNAPSHOTS") {
            self.runner.allow_snapshots = parse_flag(&value);
        }

        if let Ok(value) = std::env::var("TDDGATE_INCLUDE_UNTRACKED") {
            self.git.include_untracked = parse_flag(&value);
        }

        self
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, state_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = state_dir {
            self.state.dir = dir;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(state_dir: Option<PathBuf>) -> Result<Self> {
        Ok(Self::load()?
            .with_env_overrides()
            .with_cli_overrides(state_dir))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
