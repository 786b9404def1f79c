//! Output helpers shared by commands

use serde::Serialize;
use serde_json::Value;
use tddgate_core::workflow::ValidationReport;

/// Captured output carried by rejected reports, in print order
const OUTPUT_ARTIFACTS: [&str; 6] = [
    "test_output",
    "stderr",
    "intent_test_output",
    "intent_test_stderr",
    "full_suite_output",
    "full_suite_stderr",
];

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Print a validator report as JSON or as a readable summary
pub fn print_report(report: &ValidationReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }

    if report.allowed {
        println!("✅ ALLOWED → {}", report.phase);
    } else {
        println!("❌ BLOCKED (phase: {})", report.phase);
    }
    for reason in report.reasons.iter().filter(|r| !r.is_empty()) {
        println!("  {}", reason);
    }
    if !report.allowed {
        for key in OUTPUT_ARTIFACTS {
            let captured = report
                .artifacts
                .get(key)
                .and_then(Value::as_str)
                .filter(|text| !text.trim().is_empty());
            if let Some(text) = captured {
                println!();
                println!("--- {} ---", key);
                println!("{}", text.trim_end());
            }
        }
    }
    if !report.warnings.is_empty() {
        println!();
        for warning in &report.warnings {
            println!("⚠️  {}", warning);
        }
    }
    Ok(())
}
