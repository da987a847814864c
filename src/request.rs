//! The inputs and results of one execution.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Why an execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    Completed,
    TimedOut,
    SegFault,
    ValgrindFail,
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommandOutcome::Completed => "completed",
            CommandOutcome::TimedOut => "timed out",
            CommandOutcome::SegFault => "segmentation fault",
            CommandOutcome::ValgrindFail => "valgrind reported errors",
        })
    }
}

/// Everything needed to run one program once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub command: String,
    /// Script of input lines; `None` runs the program in batch mode.
    pub input: Option<PathBuf>,
    pub prompt: Option<String>,
    pub timeout: Duration,
    /// Overrides applied on top of the inherited environment.
    pub environment: BTreeMap<String, String>,
    pub use_valgrind: bool,
    pub valgrind_opts: String,
    pub working_dir: PathBuf,
}

impl ExecutionRequest {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// A batch-mode request with the default timeout, run in the current
    /// directory.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            input: None,
            prompt: None,
            timeout: Self::DEFAULT_TIMEOUT,
            environment: BTreeMap::new(),
            use_valgrind: false,
            valgrind_opts: String::new(),
            working_dir: PathBuf::from("."),
        }
    }

    pub fn with_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(path.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment.extend(environment);
        self
    }

    pub fn with_valgrind(mut self, opts: impl Into<String>) -> Self {
        self.use_valgrind = true;
        self.valgrind_opts = opts.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }
}

/// Captured output and the reason the program stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub output: String,
    pub outcome: CommandOutcome,
    /// Time spent draining output; never more than the request timeout plus
    /// scheduling slack.
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let req = ExecutionRequest::new("./shell");
        assert_eq!(req.command, "./shell");
        assert_eq!(req.timeout, Duration::from_secs(10));
        assert!(req.input.is_none());
        assert!(req.prompt.is_none());
        assert!(!req.use_valgrind);
    }

    #[test]
    fn test_builder_chain() {
        let req = ExecutionRequest::new("cat")
            .with_input("in.txt")
            .with_prompt("> ")
            .with_timeout(Duration::from_secs(2))
            .with_env("A", "1")
            .with_valgrind("--leak-check=full");
        assert_eq!(req.input, Some(PathBuf::from("in.txt")));
        assert_eq!(req.prompt.as_deref(), Some("> "));
        assert_eq!(req.timeout, Duration::from_secs(2));
        assert_eq!(req.environment.get("A").map(String::as_str), Some("1"));
        assert!(req.use_valgrind);
        assert_eq!(req.valgrind_opts, "--leak-check=full");
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        let json = serde_json::to_string(&CommandOutcome::ValgrindFail).unwrap();
        assert_eq!(json, "\"valgrind_fail\"");
    }
}
