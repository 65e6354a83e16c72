//! Report rendering: console table or JSON document

use anyhow::Context as _;
use posture_core::{RunReport, Status};
use std::io::Write;

/// Render the report for humans
pub fn render_console(report: &RunReport, out: &mut impl Write) -> anyhow::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "Run {} | services: {}",
        report.run_id,
        report.services.join(", ")
    )?;
    writeln!(out)?;

    for result in &report.results {
        writeln!(
            out,
            "{:<5} {:<13} {:<40} {}",
            result.status.to_string(),
            result.severity.to_string(),
            result.rule_id,
            result.resource_id,
        )?;
        if result.status != Status::Pass && !result.status_extended.is_empty() {
            writeln!(out, "      {}", result.status_extended)?;
        }
    }

    let summary = &report.summary;
    writeln!(out)?;
    writeln!(
        out,
        "{} checks: {} passed, {} failed, {} errors, {} skipped ({} ms)",
        summary.total(),
        summary.passed,
        summary.failed,
        summary.errors,
        summary.skipped,
        report.duration_ms,
    )?;
    if summary.suppressed_failures > 0 {
        writeln!(
            out,
            "{} discovery branch failure(s) suppressed by on_error: continue",
            summary.suppressed_failures
        )?;
    }
    for failure in &summary.discovery_failures {
        writeln!(out, "discovery failed: {failure}")?;
    }
    Ok(())
}

/// Render the full report as pretty-printed JSON
pub fn render_json(report: &RunReport, out: &mut impl Write) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, report).context("serializing report")?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use posture_core::{CheckResult, Severity};

    fn sample_report() -> RunReport {
        let mut report = RunReport::new(vec!["s3".to_string()]);
        report.push(
            CheckResult::new("s3_versioning", "my-bucket", Status::Fail, Severity::High)
                .with_explanation("status equals Enabled: found 'Suspended'"),
        );
        report.push(CheckResult::new(
            "s3_versioning",
            "other-bucket",
            Status::Pass,
            Severity::High,
        ));
        report
    }

    #[test]
    fn test_console_includes_failures_and_summary() {
        let mut buffer = Vec::new();
        render_console(&sample_report(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("FAIL"));
        assert!(text.contains("my-bucket"));
        assert!(text.contains("Suspended"));
        assert!(text.contains("1 passed, 1 failed"));
    }

    #[test]
    fn test_json_is_valid_and_complete() {
        let mut buffer = Vec::new();
        render_json(&sample_report(), &mut buffer).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed["results"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["summary"]["failed"], 1);
    }
}
