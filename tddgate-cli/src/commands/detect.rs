//! Detect command - Find the test framework or the scope root

use std::path::PathBuf;

use clap::{ArgGroup, Args};
use serde_json::json;
use tddgate_core::workflow::{detect_scope_root, FrameworkDetector};

use super::{scope, Exit};
use crate::output::print_json;

/// Arguments for the detect command
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["scope_root", "detect_scope"])))]
pub struct DetectArgs {
    /// Scope root to detect the test framework in
    #[arg(long)]
    pub scope_root: Option<PathBuf>,

    /// Walk upward from this path to find the scope root
    #[arg(long)]
    pub detect_scope: Option<PathBuf>,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

impl DetectArgs {
    /// Execute the detect command
    pub fn execute(&self) -> anyhow::Result<Exit> {
        if let Some(start) = &self.detect_scope {
            return self.report_scope(start);
        }

        let Some(scope_root) = &self.scope_root else {
            anyhow::bail!("--scope-root or --detect-scope required");
        };
        let scope_root = scope(scope_root)?;

        match FrameworkDetector::new(&scope_root).detect() {
            Some(info) => {
                if self.json {
                    print_json(&json!({
                        "success": true,
                        "framework": info.name,
                        "test_command": info.test_command,
                        "targeted_template": info.targeted_template,
                        "config_source": info.config_source,
                    }))?;
                } else {
                    println!("Framework: {}", info.name);
                    println!("  test command: {}", info.test_command);
                    println!("  targeted: {}", info.targeted_template);
                    println!("  detected from: {}", info.config_source);
                }
                Ok(Exit::Allowed)
            }
            None => {
                self.not_found("No testing framework detected")?;
                Ok(Exit::Blocked)
            }
        }
    }

    fn report_scope(&self, start: &std::path::Path) -> anyhow::Result<Exit> {
        let start = scope(start)?;
        let Some(root) = detect_scope_root(&start) else {
            self.not_found("No scope root detected")?;
            return Ok(Exit::Blocked);
        };

        let message = format!("Detected scope root: {}", root.display());
        if self.json {
            print_json(&json!({
                "success": true,
                "scope_root": root,
                "message": message,
            }))?;
        } else {
            println!("{}", message);
        }
        Ok(Exit::Allowed)
    }

    fn not_found(&self, error: &str) -> anyhow::Result<()> {
        if self.json {
            print_json(&json!({ "success": false, "error": error }))
        } else {
            println!("{}", error);
            Ok(())
        }
    }
}
