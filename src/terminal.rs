//! Terminal attribute control for the PTY master.
//!
//! Changes are made through a duplicate of the master descriptor so they can
//! be held across writes to the session without borrowing it.

use crate::script::ControlKeys;
use anyhow::{Context, Result};
use nix::sys::termios::{
    LocalFlags, SetArg, SpecialCharacterIndices, Termios, tcgetattr, tcsetattr,
};
use std::os::fd::OwnedFd;
use tracing::warn;

pub struct Terminal {
    fd: OwnedFd,
}

impl Terminal {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    fn attrs(&self) -> Result<Termios> {
        tcgetattr(&self.fd).context("Failed to read terminal attributes")
    }

    fn apply(&self, attrs: &Termios) -> Result<()> {
        tcsetattr(&self.fd, SetArg::TCSANOW, attrs).context("Failed to set terminal attributes")
    }

    /// Turn on `ISIG` so control bytes written to the master raise signals in
    /// the child's foreground process group.
    pub fn enable_signal_keys(&self) -> Result<()> {
        let mut attrs = self.attrs()?;
        attrs.local_flags.insert(LocalFlags::ISIG);
        self.apply(&attrs)
    }

    pub fn control_keys(&self) -> Result<ControlKeys> {
        let attrs = self.attrs()?;
        let cc = &attrs.control_chars;
        Ok(ControlKeys {
            interrupt: cc[SpecialCharacterIndices::VINTR as usize],
            suspend: cc[SpecialCharacterIndices::VSUSP as usize],
            end_of_file: cc[SpecialCharacterIndices::VEOF as usize],
        })
    }

    /// Clear `ECHO` until the returned guard is dropped.
    pub fn suppress_echo(&self) -> Result<EchoGuard<'_>> {
        let saved = self.attrs()?;
        let mut quiet = saved.clone();
        quiet.local_flags.remove(LocalFlags::ECHO);
        self.apply(&quiet)?;
        Ok(EchoGuard {
            terminal: self,
            saved,
        })
    }
}

/// Restores the attributes captured by [`Terminal::suppress_echo`] on drop.
pub struct EchoGuard<'a> {
    terminal: &'a Terminal,
    saved: Termios,
}

impl Drop for EchoGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.terminal.apply(&self.saved) {
            // The child may already be gone, which invalidates the terminal.
            warn!(error = %e, "failed to restore terminal echo");
        }
    }
}
