//! Runs one [`ExecutionRequest`] inside a PTY and reports how it ended.

use crate::drain::{DrainResult, OutputDecoder, drain_with};
use crate::pty::PtySession;
use crate::pty_reader::spawn_reader;
use crate::request::{CommandOutcome, Execution, ExecutionRequest};
use crate::script::{ControlKeys, STARTUP_DELAY, Script, ScriptLine};
use crate::template;
use crate::terminal::Terminal;
use crate::tracker::ChildTracker;
use anyhow::{Context, Result, anyhow, bail};
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use std::sync::mpsc::Receiver;
use std::time::Duration;
use tracing::{debug, info};

/// Name of the memory checker prefixed to the command line.
pub const VALGRIND: &str = "valgrind";

/// Exit code valgrind is told to use when it finds errors.
pub const VALGRIND_ERROR_EXITCODE: i32 = 99;

/// Signals that count as the program crashing on a bad memory access.
const FAULT_SIGNALS: &[Signal] = &[Signal::SIGSEGV, Signal::SIGBUS];

/// Drives programs through a PTY, one request at a time.
#[derive(Debug, Clone, Default)]
pub struct Controller {
    tracker: Option<ChildTracker>,
}

/// Output gathered so far and the time charged against the request timeout.
///
/// One decoder spans every drain, so a character or line ending split
/// between two drains is decoded whole.
struct Transcript {
    output: String,
    decoder: OutputDecoder,
    consumed: Duration,
    alive: bool,
}

impl Transcript {
    fn new() -> Self {
        Self {
            output: String::new(),
            decoder: OutputDecoder::new(),
            consumed: Duration::ZERO,
            alive: true,
        }
    }

    fn drain(
        &mut self,
        stream: &Receiver<Vec<u8>>,
        budget: Duration,
        prompt: Option<&str>,
    ) -> DrainResult {
        let result = drain_with(&mut self.decoder, stream, budget, prompt);
        self.output.push_str(&result.text);
        self.consumed += result.elapsed;
        self.alive = result.alive;
        result
    }

    fn into_output(self) -> String {
        let mut output = self.output;
        output.push_str(&self.decoder.finish());
        output
    }

    fn remaining(&self, timeout: Duration) -> Duration {
        timeout.saturating_sub(self.consumed)
    }
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish each spawned child to `tracker` while it runs.
    pub fn with_tracker(mut self, tracker: ChildTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Run the request to completion, timeout, or crash.
    ///
    /// # Errors
    ///
    /// Only precondition failures are errors: an untokenizable command, an
    /// unreadable input script or failing template command, or a PTY that
    /// cannot be opened or spawned into. Timeouts and crashes are reported
    /// through [`CommandOutcome`].
    pub fn execute(&self, request: &ExecutionRequest) -> Result<Execution> {
        let argv = build_argv(request)?;
        let script = request
            .input
            .as_ref()
            .map(|path| {
                template::expand_file(path)
                    .map(|text| Script::parse(&text, request.prompt.as_deref()))
            })
            .transpose()
            .context("Failed to load input script")?;

        if self.tracker.as_ref().is_some_and(ChildTracker::is_halted) {
            bail!("Run was interrupted before the program started");
        }
        let (mut session, reader) =
            PtySession::spawn(&argv, &request.environment, &request.working_dir)?;
        let _registration = self
            .tracker
            .as_ref()
            .map(|tracker| tracker.register(session.pid()));

        let terminal = Terminal::new(session.terminal_fd()?);
        terminal.enable_signal_keys()?;
        let keys = terminal.control_keys()?;

        let output = spawn_reader(reader)?;
        let mut transcript = Transcript::new();
        let mut live = Live {
            session: &mut session,
            terminal: &terminal,
            keys,
            output: &output,
        };
        match &script {
            None => {
                transcript.drain(live.output, request.timeout, None);
            }
            Some(script) => interact(&mut live, script, request, &mut transcript)?,
        }

        let outcome = finish(&mut session, &transcript, request)?;
        let elapsed = transcript.consumed;
        info!(
            command = %request.command,
            %outcome,
            elapsed_ms = elapsed.as_millis() as u64,
            "execution finished"
        );
        Ok(Execution {
            output: transcript.into_output(),
            outcome,
            elapsed,
        })
    }
}

/// The parent's handles on a running child.
struct Live<'a> {
    session: &'a mut PtySession,
    terminal: &'a Terminal,
    keys: ControlKeys,
    output: &'a Receiver<Vec<u8>>,
}

/// Feed the script line by line, draining after each write.
fn interact(
    live: &mut Live<'_>,
    script: &Script,
    request: &ExecutionRequest,
    transcript: &mut Transcript,
) -> Result<()> {
    let timeout = request.timeout;
    let prompt = request.prompt.as_deref();

    // Startup banner and first prompt.
    let startup = match prompt {
        Some(_) => timeout,
        None => STARTUP_DELAY.min(timeout),
    };
    transcript.drain(live.output, startup, prompt);

    if script.is_empty() && transcript.alive {
        let remaining = transcript.remaining(timeout);
        transcript.drain(live.output, remaining, None);
        return Ok(());
    }

    for (index, line) in script.lines().iter().enumerate() {
        if !transcript.alive || transcript.remaining(timeout).is_zero() {
            debug!(index, "stopping script early");
            break;
        }

        let quiet = match line {
            ScriptLine::Control(_) => Some(live.terminal.suppress_echo()?),
            ScriptLine::Text(_) => None,
        };
        if let Err(e) = live.session.write(&line.bytes(&live.keys)) {
            debug!(index, error = %e, "write to child failed, collecting remaining output");
            let remaining = transcript.remaining(timeout);
            transcript.drain(live.output, remaining, None);
            break;
        }
        let plan = script.plan_after(index, transcript.remaining(timeout));
        let result = transcript.drain(live.output, plan.budget, plan.target);
        drop(quiet);

        debug!(
            index,
            bytes = result.text.len(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            alive = result.alive,
            "script line drained"
        );
    }
    Ok(())
}

/// Tokenize the command, prefixing the memory checker when requested.
pub fn build_argv(request: &ExecutionRequest) -> Result<Vec<String>> {
    let command = shlex::split(&request.command)
        .ok_or_else(|| anyhow!("Cannot tokenize command: {}", request.command))?;
    if command.is_empty() {
        return Err(anyhow!("Command is empty"));
    }
    if !request.use_valgrind {
        return Ok(command);
    }

    let opts = shlex::split(&request.valgrind_opts)
        .ok_or_else(|| anyhow!("Cannot tokenize valgrind options: {}", request.valgrind_opts))?;
    let mut argv = vec![
        VALGRIND.to_string(),
        format!("--error-exitcode={VALGRIND_ERROR_EXITCODE}"),
    ];
    argv.extend(opts);
    argv.extend(command);
    Ok(argv)
}

/// Reap the child, killing it first if the budget ran out.
fn finish(
    session: &mut PtySession,
    transcript: &Transcript,
    request: &ExecutionRequest,
) -> Result<CommandOutcome> {
    let remaining = transcript.remaining(request.timeout);
    if remaining.is_zero() {
        session.force_kill()?;
        session.wait()?;
        return Ok(CommandOutcome::TimedOut);
    }

    match session.wait_within(remaining)? {
        Some(status) => Ok(classify(status, request.use_valgrind)),
        None => {
            // Closed its terminal but kept running.
            session.force_kill()?;
            session.wait()?;
            Ok(CommandOutcome::TimedOut)
        }
    }
}

/// Map a reaped child's status to an outcome.
pub fn classify(status: WaitStatus, use_valgrind: bool) -> CommandOutcome {
    match status {
        WaitStatus::Signaled(_, signal, _) if FAULT_SIGNALS.contains(&signal) => {
            CommandOutcome::SegFault
        }
        WaitStatus::Exited(_, code) if use_valgrind && code == VALGRIND_ERROR_EXITCODE => {
            CommandOutcome::ValgrindFail
        }
        _ => CommandOutcome::Completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Pid;

    fn pid() -> Pid {
        Pid::from_raw(4242)
    }

    #[test]
    fn test_classify_segfault() {
        let status = WaitStatus::Signaled(pid(), Signal::SIGSEGV, false);
        assert_eq!(classify(status, false), CommandOutcome::SegFault);
        let status = WaitStatus::Signaled(pid(), Signal::SIGBUS, true);
        assert_eq!(classify(status, true), CommandOutcome::SegFault);
    }

    #[test]
    fn test_classify_other_signal_completes() {
        let status = WaitStatus::Signaled(pid(), Signal::SIGINT, false);
        assert_eq!(classify(status, false), CommandOutcome::Completed);
    }

    #[test]
    fn test_classify_valgrind_code_only_with_valgrind() {
        let status = WaitStatus::Exited(pid(), VALGRIND_ERROR_EXITCODE);
        assert_eq!(classify(status, true), CommandOutcome::ValgrindFail);
        assert_eq!(classify(status, false), CommandOutcome::Completed);
    }

    #[test]
    fn test_classify_exit_codes_complete() {
        assert_eq!(
            classify(WaitStatus::Exited(pid(), 0), true),
            CommandOutcome::Completed
        );
        assert_eq!(
            classify(WaitStatus::Exited(pid(), 1), false),
            CommandOutcome::Completed
        );
    }

    #[test]
    fn test_build_argv_plain() {
        let req = ExecutionRequest::new("./prog --name 'two words'");
        assert_eq!(
            build_argv(&req).unwrap(),
            vec!["./prog", "--name", "two words"]
        );
    }

    #[test]
    fn test_build_argv_with_valgrind() {
        let req = ExecutionRequest::new("./prog -x").with_valgrind("--leak-check=full -q");
        assert_eq!(
            build_argv(&req).unwrap(),
            vec![
                "valgrind",
                "--error-exitcode=99",
                "--leak-check=full",
                "-q",
                "./prog",
                "-x"
            ]
        );
    }

    #[test]
    fn test_build_argv_rejects_bad_quoting() {
        let err = build_argv(&ExecutionRequest::new("echo 'unterminated"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("Cannot tokenize"), "got: {err}");
    }

    #[test]
    fn test_build_argv_rejects_empty() {
        assert!(build_argv(&ExecutionRequest::new("   ")).is_err());
    }
}
