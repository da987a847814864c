//! # ttygrade
//!
//! Grades interactive command-line programs by driving them through a
//! pseudoterminal and comparing what they print with golden output.
//!
//! A program is started on a fresh PTY, optionally fed a script of input
//! lines, and its output is collected under a single time budget. The result
//! is one of four [`CommandOutcome`]s plus everything the program printed.
//! A completed run is then compared with the expected output by [`compare`],
//! which ignores blank lines and differences in spacing.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use ttygrade::{Controller, ExecutionRequest, CommandOutcome, compare};
//!
//! fn main() -> anyhow::Result<()> {
//!     let request = ExecutionRequest::new("./myshell")
//!         .with_input("tests/pipes.in")
//!         .with_prompt("$ ")
//!         .with_timeout(Duration::from_secs(5));
//!
//!     let execution = Controller::new().execute(&request)?;
//!     if execution.outcome == CommandOutcome::Completed {
//!         let expected = std::fs::read_to_string("tests/pipes.out")?;
//!         let diff = compare(&expected, &execution.output);
//!         if !diff.matched {
//!             println!("{}", diff.diff);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Input scripts
//!
//! Each line of the input file is sent as typed, followed by a newline. A
//! line consisting of `^C`, `^Z` or `^D` sends the terminal's interrupt,
//! suspend or end-of-file character instead. When a prompt is configured, a
//! line that starts with the prompt is sent without it, so a transcript
//! copied from a real session works as a script, and the controller waits
//! for the prompt before sending such a line.
//!
//! Both input scripts and expected output may contain `{{ command }}`
//! placeholders, replaced by the command's output (see [`template`]).
//!
//! ## Suites
//!
//! [`Suite::load`] reads a YAML test suite and [`Runner`] runs it test by
//! test, producing a [`RunSummary`] that [`report`] renders for the console
//! or as JSON.

pub mod controller;
pub mod diff;
pub mod drain;
pub(crate) mod pty;
pub(crate) mod pty_reader;
pub mod report;
pub mod request;
pub mod runner;
pub mod script;
pub mod suite;
pub mod template;
pub(crate) mod terminal;
pub mod tracker;

pub use controller::Controller;
pub use diff::{DiffOutcome, compare};
pub use drain::{DrainResult, OutputDecoder, drain, drain_with};
pub use request::{CommandOutcome, Execution, ExecutionRequest};
pub use runner::{RunSummary, Runner, TestResult, TestStatus};
pub use script::{ControlKey, Script, ScriptLine};
pub use suite::{Suite, TestCase};
pub use tracker::ChildTracker;
