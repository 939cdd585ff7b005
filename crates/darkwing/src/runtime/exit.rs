//! Process termination and exit code mapping.
#![allow(unsafe_code)]

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::signal::unix::{SignalKind, signal};

/// How a process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Normal exit with a status.
    Exited(i32),
    /// Killed by a signal.
    Signaled(i32),
}

impl ExitOutcome {
    /// Shell-style exit code: the status, or `128 + signal`.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::Signaled(signal) => 128 + signal,
        }
    }

    /// Whether the process exited with status zero.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Decode a raw `waitpid` status.
    #[must_use]
    pub fn from_wait_status(status: libc::c_int) -> Self {
        if libc::WIFEXITED(status) {
            Self::Exited(libc::WEXITSTATUS(status))
        } else if libc::WIFSIGNALED(status) {
            Self::Signaled(libc::WTERMSIG(status))
        } else {
            Self::Exited(1)
        }
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited(code),
            (None, Some(signal)) => Self::Signaled(signal),
            (None, None) => Self::Exited(1),
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with status {code}"),
            Self::Signaled(signal) => write!(f, "killed by signal {signal}"),
        }
    }
}

/// Fallback poll interval in case a SIGCHLD is coalesced away.
const REAP_POLL: Duration = Duration::from_millis(250);

/// Reap `pid` if it has terminated, without blocking.
///
/// # Errors
///
/// Returns the OS error from `waitpid`, including `ECHILD` when `pid` is
/// not ours to reap.
pub fn try_wait_pid(pid: libc::pid_t) -> std::io::Result<Option<ExitOutcome>> {
    let mut status: libc::c_int = 0;
    loop {
        // SAFETY: status is a valid out pointer for the duration of the call.
        let result = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
        match result {
            -1 => {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            0 => return Ok(None),
            _ => return Ok(Some(ExitOutcome::from_wait_status(status))),
        }
    }
}

/// Wait until `pid` terminates and decode its status.
///
/// The caller must be the parent or subreaper of `pid`. Every SIGCHLD
/// triggers a non-blocking reap attempt, so dropping the future stops the
/// wait without leaving a thread behind.
///
/// # Errors
///
/// Returns the error from [`try_wait_pid`] or from installing the SIGCHLD
/// listener.
pub async fn wait_pid(pid: libc::pid_t) -> std::io::Result<ExitOutcome> {
    let mut children = signal(SignalKind::child())?;
    loop {
        if let Some(outcome) = try_wait_pid(pid)? {
            return Ok(outcome);
        }
        tokio::select! {
            _ = children.recv() => {}
            () = tokio::time::sleep(REAP_POLL) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_codes() {
        assert_eq!(ExitOutcome::Signaled(libc::SIGKILL).code(), 137);
        assert_eq!(ExitOutcome::Signaled(libc::SIGTERM).code(), 143);
        assert_eq!(ExitOutcome::Exited(17).code(), 17);
        assert!(ExitOutcome::Exited(0).success());
        assert!(!ExitOutcome::Signaled(libc::SIGINT).success());
    }

    #[test]
    fn from_exit_status() {
        let status = std::process::Command::new("sh")
            .args(["-c", "exit 3"])
            .status()
            .unwrap();
        assert_eq!(ExitOutcome::from(status), ExitOutcome::Exited(3));

        let status = std::process::Command::new("sh")
            .args(["-c", "kill -9 $$"])
            .status()
            .unwrap();
        assert_eq!(ExitOutcome::from(status), ExitOutcome::Signaled(9));
    }

    #[tokio::test]
    async fn wait_pid_reaps_child() {
        let child = std::process::Command::new("sh")
            .args(["-c", "exit 5"])
            .spawn()
            .unwrap();
        let pid = libc::pid_t::try_from(child.id()).unwrap();
        assert_eq!(wait_pid(pid).await.unwrap(), ExitOutcome::Exited(5));
    }

    #[tokio::test]
    async fn dropped_wait_leaves_child_alone() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = libc::pid_t::try_from(child.id()).unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(300), wait_pid(pid)).await;
        assert!(waited.is_err());
        assert_eq!(try_wait_pid(pid).unwrap(), None);

        child.kill().unwrap();
        let status = child.wait().unwrap();
        assert_eq!(ExitOutcome::from(status), ExitOutcome::Signaled(libc::SIGKILL));
    }

    #[test]
    fn wait_pid_rejects_strangers() {
        let err = try_wait_pid(1).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ECHILD));
    }
}
