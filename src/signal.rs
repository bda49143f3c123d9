//! Forwarding a termination signal to the live child (spec §5).
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How long to let a signalled child exit on its own before a hard kill is
/// sent. Short, per spec §5's "bounded by a short grace window".
const GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Tracks whether the engine has been asked to terminate, and forwards that
/// request to whichever child is currently running.
///
/// Holds only the child's pid, not the [`std::process::Child`] itself: the
/// executor keeps ownership of the child (it needs it to call `wait`), and
/// signal delivery is done by shelling out to a platform kill utility rather
/// than by holding a handle.
#[derive(Clone)]
pub struct Interrupt {
    interrupted: Arc<AtomicBool>,
    child_pid: Arc<Mutex<Option<u32>>>,
}

impl Interrupt {
    /// Install a process-wide Ctrl-C / SIGTERM handler.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler is already installed (only one may
    /// exist per process).
    pub fn install() -> Result<Self, ctrlc::Error> {
        let interrupted = Arc::new(AtomicBool::new(false));
        let child_pid: Arc<Mutex<Option<u32>>> = Arc::new(Mutex::new(None));

        let interrupted_handler = Arc::clone(&interrupted);
        let pid_handler = Arc::clone(&child_pid);
        ctrlc::set_handler(move || {
            interrupted_handler.store(true, Ordering::SeqCst);
            let pid = *pid_handler
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(pid) = pid {
                forward_signal(pid, Signal::Terminate);
                std::thread::sleep(GRACE_PERIOD);
                forward_signal(pid, Signal::Kill);
            }
        })?;

        Ok(Self {
            interrupted,
            child_pid,
        })
    }

    /// Record the pid of the child currently being awaited, so a signal
    /// received mid-command can be forwarded to it. Pass `None` once the
    /// child has exited.
    pub fn track(&self, pid: Option<u32>) {
        *self
            .child_pid
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = pid;
    }

    /// Whether a termination signal has been received.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// An `Interrupt` with no signal handler installed: it never reports
    /// itself as interrupted and tracks nothing. For running the executor
    /// without a process-wide handler (tests, or hosts that manage signals
    /// themselves).
    #[must_use]
    pub fn disarmed() -> Self {
        Self {
            interrupted: Arc::new(AtomicBool::new(false)),
            child_pid: Arc::new(Mutex::new(None)),
        }
    }
}

enum Signal {
    Terminate,
    Kill,
}

/// Send a termination request to `pid`. Shells out to a platform utility
/// rather than linking a signals crate, matching the engine's own
/// spawn-a-process style for anything outside the core pipeline.
fn forward_signal(pid: u32, signal: Signal) {
    #[cfg(unix)]
    {
        let flag = match signal {
            Signal::Terminate => "-TERM",
            Signal::Kill => "-KILL",
        };
        let _ = std::process::Command::new("kill")
            .arg(flag)
            .arg(pid.to_string())
            .status();
    }
    #[cfg(windows)]
    {
        let _ = signal;
        let _ = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .status();
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn bare_interrupt() -> Interrupt {
        Interrupt::disarmed()
    }

    #[test]
    fn track_stores_and_clears_pid() {
        let interrupt = bare_interrupt();
        interrupt.track(Some(123));
        assert_eq!(*interrupt.child_pid.lock().unwrap(), Some(123));
        interrupt.track(None);
        assert_eq!(*interrupt.child_pid.lock().unwrap(), None);
    }

    #[test]
    fn is_interrupted_reflects_flag() {
        let interrupt = bare_interrupt();
        assert!(!interrupt.is_interrupted());
        interrupt.interrupted.store(true, Ordering::SeqCst);
        assert!(interrupt.is_interrupted());
    }
}
