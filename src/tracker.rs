use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Publishes the pid of the child currently under test so another thread can
/// stop the run.
#[derive(Debug, Clone, Default)]
pub struct ChildTracker {
    current: Arc<Mutex<Option<Pid>>>,
    halted: Arc<AtomicBool>,
}

impl ChildTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `pid` as in flight until the returned guard is dropped.
    ///
    /// A child registered after [`interrupt`](Self::interrupt) is killed on
    /// the spot.
    pub fn register(&self, pid: Pid) -> Registration<'_> {
        self.set(Some(pid));
        // Publish before checking, so either this or `interrupt` sees the other.
        if self.is_halted() {
            info!(%pid, "run already interrupted: killing new child");
            terminate(pid);
        }
        Registration { tracker: self }
    }

    /// Mark the run as halted and kill the in-flight child, if any.
    pub fn interrupt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        let current = *self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pid) = current {
            info!(%pid, "interrupt: killing in-flight child");
            terminate(pid);
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    fn set(&self, pid: Option<Pid>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = pid;
    }
}

fn terminate(pid: Pid) {
    match kill(pid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(%pid, error = %e, "failed to kill in-flight child"),
    }
}

pub struct Registration<'a> {
    tracker: &'a ChildTracker,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.tracker.set(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_clears_on_drop() {
        let tracker = ChildTracker::new();
        {
            let _reg = tracker.register(Pid::from_raw(999_999));
            assert_eq!(*tracker.current.lock().unwrap(), Some(Pid::from_raw(999_999)));
        }
        assert_eq!(*tracker.current.lock().unwrap(), None);
    }

    #[test]
    fn test_interrupt_without_child_sets_halted() {
        let tracker = ChildTracker::new();
        assert!(!tracker.is_halted());
        tracker.interrupt();
        assert!(tracker.is_halted());
    }

    #[test]
    fn test_register_after_interrupt_kills_child() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::Command;
        use std::time::{Duration, Instant};

        let tracker = ChildTracker::new();
        tracker.interrupt();

        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let start = Instant::now();
        let _reg = tracker.register(Pid::from_raw(child.id() as i32));
        let status = child.wait().unwrap();

        assert_eq!(status.signal(), Some(Signal::SIGKILL as i32));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_interrupt_kills_registered_child() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::Command;

        let tracker = ChildTracker::new();
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let _reg = tracker.register(Pid::from_raw(child.id() as i32));
        tracker.interrupt();

        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGKILL as i32));
    }
}
