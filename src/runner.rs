//! Runs every test of a suite in order and grades the results.

use crate::controller::Controller;
use crate::diff::compare;
use crate::request::CommandOutcome;
use crate::suite::{Suite, TestCase};
use crate::template;
use crate::tracker::ChildTracker;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Mismatch,
    TimedOut,
    SegFault,
    ValgrindFail,
    Error,
}

impl From<CommandOutcome> for TestStatus {
    fn from(outcome: CommandOutcome) -> Self {
        match outcome {
            CommandOutcome::Completed => TestStatus::Passed,
            CommandOutcome::TimedOut => TestStatus::TimedOut,
            CommandOutcome::SegFault => TestStatus::SegFault,
            CommandOutcome::ValgrindFail => TestStatus::ValgrindFail,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub description: String,
    pub status: TestStatus,
    pub points: u32,
    pub earned: u32,
    pub elapsed_ms: u64,
    /// The diff for a mismatch, captured output for a crash or timeout, the
    /// error chain for an error. Empty on a pass.
    pub detail: String,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub tests: Vec<TestResult>,
    pub earned: u32,
    pub possible: u32,
    /// The run was stopped before every test finished.
    pub interrupted: bool,
}

/// A graded test plus the raw texts written to the results directory.
struct Graded {
    result: TestResult,
    slug: String,
    expected: Option<String>,
    actual: String,
}

pub struct Runner {
    suite: Suite,
    controller: Controller,
    tracker: ChildTracker,
    results_dir: Option<PathBuf>,
    working_dir: PathBuf,
}

impl Runner {
    pub fn new(suite: Suite) -> Self {
        let tracker = ChildTracker::new();
        Self {
            suite,
            controller: Controller::new().with_tracker(tracker.clone()),
            tracker,
            results_dir: None,
            working_dir: PathBuf::from("."),
        }
    }

    /// Write expected/actual/diff files for each test into `dir`.
    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = Some(dir.into());
        self
    }

    /// Directory the programs under test are started in.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Handle for stopping the run from another thread.
    pub fn tracker(&self) -> ChildTracker {
        self.tracker.clone()
    }

    pub fn run(&self) -> Result<RunSummary> {
        if let Some(dir) = &self.results_dir {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create results directory: {}", dir.display()))?;
        }

        let mut summary = RunSummary::default();
        for test in &self.suite.tests {
            if self.tracker.is_halted() {
                summary.interrupted = true;
                break;
            }
            info!(test = %test.name, "running test");
            let graded = self.run_test(test);
            if self.tracker.is_halted() {
                // Killed from outside; the outcome says nothing about the program.
                info!(test = %test.name, "discarding result of interrupted test");
                summary.interrupted = true;
                break;
            }
            if let Some(dir) = &self.results_dir {
                persist(dir, &graded)?;
            }
            info!(
                test = %test.name,
                status = ?graded.result.status,
                earned = graded.result.earned,
                "test finished"
            );
            summary.possible += graded.result.points;
            summary.earned += graded.result.earned;
            summary.tests.push(graded.result);
        }
        Ok(summary)
    }

    fn run_test(&self, test: &TestCase) -> Graded {
        match self.grade(test) {
            Ok(graded) => graded,
            Err(e) => {
                warn!(test = %test.name, error = %format!("{e:#}"), "test could not be run");
                Graded {
                    result: TestResult {
                        name: test.name.clone(),
                        description: test.description.clone(),
                        status: TestStatus::Error,
                        points: test.points,
                        earned: 0,
                        elapsed_ms: 0,
                        detail: format!("{e:#}"),
                    },
                    slug: test.slug(),
                    expected: None,
                    actual: String::new(),
                }
            }
        }
    }

    fn grade(&self, test: &TestCase) -> Result<Graded> {
        let request = test.request(&self.working_dir);
        let execution = self.controller.execute(&request)?;

        let mut status = TestStatus::from(execution.outcome);
        let mut detail = String::new();
        let mut expected = None;
        if execution.outcome == CommandOutcome::Completed {
            let golden = template::expand_file(&test.output_file)
                .context("Failed to load expected output")?;
            let diff = compare(&golden, &execution.output);
            if !diff.matched {
                status = TestStatus::Mismatch;
                detail = diff.diff;
            }
            expected = Some(golden);
        } else {
            detail = execution.output.clone();
        }

        Ok(Graded {
            result: TestResult {
                name: test.name.clone(),
                description: test.description.clone(),
                status,
                points: test.points,
                earned: if status == TestStatus::Passed { test.points } else { 0 },
                elapsed_ms: duration_ms(execution.elapsed),
                detail,
            },
            slug: test.slug(),
            expected,
            actual: execution.output,
        })
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn persist(dir: &Path, graded: &Graded) -> Result<()> {
    let write = |ext: &str, content: &str| {
        let path = dir.join(format!("{}.{ext}", graded.slug));
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
    };
    if let Some(expected) = &graded.expected {
        write("expected", expected)?;
    }
    write("actual", &graded.actual)?;
    if graded.result.status == TestStatus::Mismatch {
        write("diff", &graded.result.detail)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_outcome() {
        assert_eq!(TestStatus::from(CommandOutcome::TimedOut), TestStatus::TimedOut);
        assert_eq!(TestStatus::from(CommandOutcome::SegFault), TestStatus::SegFault);
        assert_eq!(
            TestStatus::from(CommandOutcome::ValgrindFail),
            TestStatus::ValgrindFail
        );
    }

    #[test]
    fn test_persist_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let graded = Graded {
            result: TestResult {
                name: "my test".into(),
                description: String::new(),
                status: TestStatus::Mismatch,
                points: 1,
                earned: 0,
                elapsed_ms: 5,
                detail: "EXPECT 1) a\n".into(),
            },
            slug: "my_test".into(),
            expected: Some("a\n".into()),
            actual: "b\n".into(),
        };
        persist(dir.path(), &graded).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("my_test.expected")).unwrap(), "a\n");
        assert_eq!(fs::read_to_string(dir.path().join("my_test.actual")).unwrap(), "b\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("my_test.diff")).unwrap(),
            "EXPECT 1) a\n"
        );
    }
}
