//! Human-readable summaries
//!
//! Rendering only reads the results it is given.

use std::fmt::Write as _;
use std::time::Duration;

use console::style;

use crate::ci::CiResult;
use crate::runner::{TaskResult, TaskRunSummary};

fn secs(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}

fn task_line(result: &TaskResult) -> String {
    let status = if result.skipped {
        style("-").dim()
    } else if result.success {
        style("✓").green()
    } else {
        style("✗").red()
    };

    let mut line = format!(
        "{} {} {}",
        status,
        style(&result.name).bold(),
        style(secs(result.duration)).dim()
    );

    if let Some(counts) = result.test_counts {
        let _ = write!(
            line,
            " ({} passed, {} failed, {} skipped)",
            counts.passed, counts.failed, counts.skipped
        );
    }

    line
}

/// Per-target lines followed by a totals line
pub fn render_run_summary(summary: &TaskRunSummary) -> String {
    let mut out = String::new();

    for result in &summary.results {
        let _ = writeln!(out, "{}", task_line(result));
        if let Some(error) = &result.error {
            let _ = writeln!(out, "  {}", style(error).red());
        }
    }

    let _ = writeln!(out);
    if summary.success() {
        let _ = writeln!(
            out,
            "{} {} '{}' completed in {} ({} skipped)",
            style("✓").green().bold(),
            summary.succeeded(),
            summary.command,
            secs(summary.duration),
            summary.skipped()
        );
    } else {
        let _ = writeln!(
            out,
            "{} '{}': {} succeeded, {} failed in {}",
            style("✗").red().bold(),
            summary.command,
            summary.succeeded(),
            summary.failed(),
            secs(summary.duration)
        );
    }

    out
}

/// Phase list, passed/failed targets, duration, artifact count, verdict
pub fn render_ci_summary(result: &CiResult) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", style("CI phases:").bold());
    for phase in &result.phase_results {
        let status = if phase.success {
            style("✓").green()
        } else {
            style("✗").red()
        };
        let _ = writeln!(
            out,
            "  {} {}/{} {}",
            status,
            phase.group,
            phase.name,
            style(secs(phase.duration)).dim()
        );
        if let Some(error) = &phase.error {
            for line in error.lines() {
                let _ = writeln!(out, "      {}", style(line).red());
            }
        }
    }

    let (passed, failed): (Vec<_>, Vec<_>) =
        result.target_results.values().partition(|t| t.success);

    if !passed.is_empty() {
        let names: Vec<&str> = passed.iter().map(|t| t.name.as_str()).collect();
        let _ = writeln!(out, "{} {}", style("Passed:").green(), names.join(", "));
    }
    if !failed.is_empty() {
        let names: Vec<&str> = failed.iter().map(|t| t.name.as_str()).collect();
        let _ = writeln!(out, "{} {}", style("Failed:").red(), names.join(", "));
    }

    let _ = writeln!(out, "Duration: {}", secs(result.duration));
    let _ = writeln!(out, "Artifacts: {}", result.artifact_count);

    if result.success {
        let _ = writeln!(out, "{}", style("CI PASSED").green().bold());
    } else {
        let _ = writeln!(out, "{}", style("CI FAILED").red().bold());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ci::{PhaseResult, TargetResult};
    use crate::target::TargetType;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn sample() -> CiResult {
        let now = Utc::now();
        let mut targets = BTreeMap::new();
        targets.insert(
            "api".to_string(),
            TargetResult {
                name: "api".to_string(),
                success: true,
                errors: vec![],
                duration: Duration::from_millis(1200),
            },
        );
        targets.insert(
            "web".to_string(),
            TargetResult {
                name: "web".to_string(),
                success: false,
                errors: vec!["[web] test: boom".to_string()],
                duration: Duration::from_millis(300),
            },
        );

        CiResult {
            start_time: now,
            end_time: now,
            duration: Duration::from_millis(1500),
            phase_results: vec![PhaseResult {
                name: "test".to_string(),
                group: TargetType::Language,
                start_time: now,
                end_time: now,
                duration: Duration::from_millis(1500),
                success: false,
                error: Some("[web] test: boom".to_string()),
                exit_code: None,
            }],
            target_results: targets,
            success: false,
            artifact_count: 3,
        }
    }

    #[test]
    fn test_ci_summary_contents() {
        let result = sample();
        let text = render_ci_summary(&result);

        assert!(text.contains("language/test"));
        assert!(text.contains("api"));
        assert!(text.contains("web"));
        assert!(text.contains("Artifacts: 3"));
        assert!(text.contains("CI FAILED"));
    }

    #[test]
    fn test_ci_summary_does_not_mutate() {
        let result = sample();
        let before = serde_json::to_string(&result).unwrap();
        let _ = render_ci_summary(&result);
        assert_eq!(serde_json::to_string(&result).unwrap(), before);
    }

    #[test]
    fn test_run_summary_reports_failures() {
        let summary = TaskRunSummary {
            command: "build".to_string(),
            results: vec![TaskResult {
                name: "api".to_string(),
                success: false,
                skipped: false,
                duration: Duration::from_millis(10),
                error: Some("[api] build: exited".to_string()),
                test_counts: None,
            }],
            duration: Duration::from_millis(10),
            error: Some(crate::error::BuildError::Cancelled),
        };

        let text = render_run_summary(&summary);
        assert!(text.contains("exited"));
        assert!(text.contains("1 failed"));
    }
}
