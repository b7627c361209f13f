//! Report generation for harness runs.
//!
//! Writes a JSON report and prints one pass/fail line per scenario.

use std::fs;
use std::io::IsTerminal;
use std::path::Path;

use color_eyre::eyre::{Context, Result};

use super::types::*;

const GREEN: &str = "\x1b[92m";
const RED: &str = "\x1b[91m";
const RESET: &str = "\x1b[0m";

/// Generate JSON report
pub fn generate_json_report(report: &RunReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

/// One summary line, e.g. `deter_simple      : finished successfully!`
pub fn format_outcome_line(outcome: &ScenarioOutcome, color: bool) -> String {
    let (start, end) = if color {
        (if outcome.success { GREEN } else { RED }, RESET)
    } else {
        ("", "")
    };
    let status = if outcome.success {
        format!("finished {}successfully{}!", start, end)
    } else {
        format!("{}failed{}!", start, end)
    };
    format!("{:17} : {}", outcome.name, status)
}

/// Print a summary to stdout
pub fn print_summary(report: &RunReport) {
    let color = std::io::stdout().is_terminal();

    println!();
    for outcome in &report.scenarios {
        for diagnostic in &outcome.diagnostics {
            println!("  {}: {}", outcome.name, diagnostic);
        }
        println!("{}", format_outcome_line(outcome, color));
    }

    println!();
    println!(
        "{} of {} scenarios passed",
        report.scenarios.len() - report.failed_count(),
        report.scenarios.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn outcome(name: &str, success: bool) -> ScenarioOutcome {
        if success {
            ScenarioOutcome::from_validation(name, ValidationResult::passed(), 4)
        } else {
            ScenarioOutcome::failure(name, "expected 3 fake images, got 1")
        }
    }

    #[test]
    fn test_format_plain_lines() {
        assert_eq!(
            format_outcome_line(&outcome("deter_simple", true), false),
            "deter_simple      : finished successfully!"
        );
        assert_eq!(
            format_outcome_line(&outcome("prob_fake_imgs", false), false),
            "prob_fake_imgs    : failed!"
        );
    }

    #[test]
    fn test_format_colored_lines() {
        let line = format_outcome_line(&outcome("deter_simple", true), true);
        assert!(line.contains("\x1b[92msuccessfully\x1b[0m"));
        let line = format_outcome_line(&outcome("deter_simple", false), true);
        assert!(line.contains("\x1b[91mfailed\x1b[0m"));
    }

    #[test]
    fn test_json_report_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = RunReport {
            metadata: RunMetadata {
                started_at: "2021-03-04T05:06:07+00:00".to_string(),
                config_path: Some("alpaca_scenarios.yaml".to_string()),
                proxy_binary: "nginx".to_string(),
                target_url: "http://localhost:8888".to_string(),
                scenario_count: 2,
            },
            scenarios: vec![outcome("deter_simple", true), outcome("prob_fake_imgs", false)],
        };

        generate_json_report(&report, &path).unwrap();
        let loaded: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.scenarios.len(), 2);
        assert!(!loaded.all_passed());
        assert_eq!(loaded.scenarios[1].diagnostics, vec!["expected 3 fake images, got 1"]);
    }
}
