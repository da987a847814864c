//! Console and JSON renderings of a [`RunSummary`].

use crate::runner::{RunSummary, TestResult, TestStatus};
use anyhow::{Context, Result};
use std::fmt::Write;

fn label(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Passed => "PASS",
        TestStatus::Mismatch => "FAIL",
        TestStatus::TimedOut => "TIME",
        TestStatus::SegFault => "SEGV",
        TestStatus::ValgrindFail => "VGRD",
        TestStatus::Error => "ERR ",
    }
}

fn heading(result: &TestResult) -> &'static str {
    match result.status {
        TestStatus::Passed => "",
        TestStatus::Mismatch => "output differs from expected",
        TestStatus::TimedOut => "timed out; output captured before the kill",
        TestStatus::SegFault => "segmentation fault; output captured before the crash",
        TestStatus::ValgrindFail => "valgrind reported errors; full log",
        TestStatus::Error => "could not run",
    }
}

/// One line per test, details for each failure, then the score.
pub fn console(summary: &RunSummary) -> String {
    let name_width = summary
        .tests
        .iter()
        .map(|t| t.name.chars().count())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for result in &summary.tests {
        let _ = writeln!(
            out,
            "{} {:<name_width$} {}/{}",
            label(result.status),
            result.name,
            result.earned,
            result.points,
        );
    }

    for result in summary.tests.iter().filter(|t| !t.passed()) {
        let _ = writeln!(out, "\n=== {}: {} ===", result.name, heading(result));
        if !result.description.is_empty() {
            let _ = writeln!(out, "{}", result.description);
        }
        out.push_str(&result.detail);
        if !result.detail.ends_with('\n') {
            out.push('\n');
        }
    }

    let _ = writeln!(out, "\nTotal: {}/{}", summary.earned, summary.possible);
    if summary.interrupted {
        out.push_str("Run interrupted; remaining tests were not run.\n");
    }
    out
}

pub fn json(summary: &RunSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("Failed to serialize run summary")
}
