use anyhow::{Context, Result, anyhow};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::os::fd::{BorrowedFd, OwnedFd};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const REAP_POLL: Duration = Duration::from_millis(10);

/// A child program attached to the slave end of a fresh PTY.
///
/// The session owns the master, the writer, and the child handle. Dropping it
/// closes the master; a child that was never reaped is killed and reaped first.
pub struct PtySession {
    master: Box<dyn MasterPty + Send>,
    // Kept so the handle lives exactly as long as the session.
    #[allow(dead_code)]
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    pid: Pid,
    reaped: bool,
}

impl PtySession {
    /// Spawn `argv` in a new PTY, returning the session and a reader for the
    /// master side separately.
    ///
    /// The child inherits this process's environment overlaid with `env` and
    /// runs in `cwd`.
    pub fn spawn(
        argv: &[String],
        env: &BTreeMap<String, String>,
        cwd: &Path,
    ) -> Result<(Self, Box<dyn Read + Send>)> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("Cannot spawn an empty command"))?;

        let pty_system = portable_pty::native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        cmd.cwd(cwd);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn command: {program}"))?;
        // Only the child may hold the slave, otherwise the master never sees
        // the stream close.
        drop(pair.slave);

        let pid = child
            .process_id()
            .map(|id| Pid::from_raw(id as i32))
            .ok_or_else(|| anyhow!("Spawned child has no process id"))?;

        let writer = pair
            .master
            .take_writer()
            .context("Failed to get PTY writer")?;
        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to get PTY reader")?;

        debug!(%pid, program = %program, "spawned child in PTY");

        let session = PtySession {
            master: pair.master,
            child,
            writer,
            pid,
            reaped: false,
        };

        Ok((session, reader))
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Duplicate the master descriptor for terminal attribute changes.
    pub fn terminal_fd(&self) -> Result<OwnedFd> {
        let raw = self
            .master
            .as_raw_fd()
            .ok_or_else(|| anyhow!("PTY master has no file descriptor"))?;
        // SAFETY: `raw` belongs to `self.master`, which is alive for this call;
        // the borrow only lasts long enough to dup it.
        let fd = unsafe { BorrowedFd::borrow_raw(raw) };
        fd.try_clone_to_owned()
            .context("Failed to duplicate PTY master descriptor")
    }

    /// Write data to the program's stdin
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Send SIGKILL to the child. A child that already exited is not an error.
    pub fn force_kill(&self) -> Result<()> {
        match kill(self.pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(anyhow!("Failed to kill child {}: {e}", self.pid)),
        }
    }

    /// Block until the child is reaped.
    pub fn wait(&mut self) -> Result<Option<WaitStatus>> {
        loop {
            match waitpid(self.pid, None) {
                Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                    self.reaped = true;
                    return Ok(Some(status));
                }
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => {
                    self.reaped = true;
                    return Ok(None);
                }
                Err(e) => return Err(anyhow!("waitpid failed for {}: {e}", self.pid)),
            }
        }
    }

    /// Poll for the child's exit for at most `limit`.
    ///
    /// Returns `Ok(None)` when the child is still running at the deadline.
    pub fn wait_within(&mut self, limit: Duration) -> Result<Option<WaitStatus>> {
        let start = Instant::now();
        loop {
            match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {}
                Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                    self.reaped = true;
                    return Ok(Some(status));
                }
                Ok(_) | Err(Errno::EINTR) => {}
                Err(e) => return Err(anyhow!("waitpid failed for {}: {e}", self.pid)),
            }
            let elapsed = start.elapsed();
            if elapsed >= limit {
                return Ok(None);
            }
            std::thread::sleep(REAP_POLL.min(limit - elapsed));
        }
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if let Err(e) = self.force_kill() {
            warn!(error = %e, "failed to kill child while closing PTY session");
            return;
        }
        if let Err(e) = self.wait() {
            warn!(error = %e, "failed to reap child while closing PTY session");
        }
    }
}
