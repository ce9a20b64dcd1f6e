//! Handle to a spawned worker process.
//!
//! The supervisor is the only owner of a [`WorkerProc`]. The process is reaped
//! exactly once, through [`WorkerProc::try_reap`] or the bounded waits built on
//! it; a handle dropped before that kills the process and reaps it with a
//! short bounded wait, so no zombie outlives its slot and a process stuck in
//! the kernel cannot block the supervisor.

use std::io;
use std::process::Command;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// Interval between non-blocking reap attempts while waiting for an exit.
pub(crate) const REAP_POLL: Duration = Duration::from_millis(10);

/// Bound on waiting for a process after SIGKILL.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Bound on the blocking reap in `Drop`, which may run on the runtime thread.
const DROP_REAP_WAIT: Duration = Duration::from_millis(50);

/// Why a worker process terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code.
    Exited(i32),
    /// Killed by signal.
    Signaled(Signal),
    /// The process was gone before its status could be collected.
    Unknown,
}

impl TerminationReason {
    /// Exit code 0 is the only graceful outcome.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(sig) => write!(f, "killed by signal {sig}"),
            Self::Unknown => f.write_str("exit status unavailable"),
        }
    }
}

/// Maps a `WaitStatus` to a termination reason; `None` while still running.
pub fn analyze_wait_status(status: WaitStatus) -> Option<TerminationReason> {
    match status {
        WaitStatus::Exited(_, code) => Some(TerminationReason::Exited(code)),
        WaitStatus::Signaled(_, sig, _) => Some(TerminationReason::Signaled(sig)),
        _ => None,
    }
}

/// Result of a terminate-then-kill sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stopped {
    pub reason: TerminationReason,
    /// SIGKILL was needed.
    pub forced: bool,
}

/// Owned handle to a worker process.
#[derive(Debug)]
pub struct WorkerProc {
    pid: Pid,
    exit: Option<TerminationReason>,
}

impl WorkerProc {
    /// Spawns `cmd` and takes ownership of the child's lifetime.
    pub fn spawn(cmd: &mut Command) -> io::Result<Self> {
        let child = cmd.spawn()?;
        let raw = i32::try_from(child.id()).map_err(|_| io::Error::other("pid out of range"))?;
        Ok(Self {
            pid: Pid::from_raw(raw),
            exit: None,
        })
    }

    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    /// Termination reason once reaped.
    pub fn exit(&self) -> Option<&TerminationReason> {
        self.exit.as_ref()
    }

    /// Non-blocking reap.
    ///
    /// Returns `Ok(None)` while the process runs. `ECHILD` means the status is
    /// gone and counts as exited with [`TerminationReason::Unknown`]. Any other
    /// error leaves the handle untouched; the caller should assume the process
    /// is alive and retry on the next wake.
    pub fn try_reap(&mut self) -> Result<Option<TerminationReason>, Errno> {
        if let Some(reason) = &self.exit {
            return Ok(Some(reason.clone()));
        }
        let reason = match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => match analyze_wait_status(status) {
                Some(reason) => reason,
                None => return Ok(None),
            },
            Err(Errno::ECHILD) => TerminationReason::Unknown,
            Err(Errno::EINTR) => return Ok(None),
            Err(errno) => return Err(errno),
        };
        self.exit = Some(reason.clone());
        Ok(Some(reason))
    }

    /// Sends `sig`. Already reaped processes are not signalled.
    pub fn signal(&self, sig: Signal) -> Result<(), Errno> {
        if self.exit.is_some() {
            return Ok(());
        }
        signal::kill(self.pid, sig)
    }

    pub fn terminate(&self) -> Result<(), Errno> {
        self.signal(Signal::SIGTERM)
    }

    pub fn kill(&self) -> Result<(), Errno> {
        self.signal(Signal::SIGKILL)
    }

    /// Polls until the process is reaped or `timeout` elapses.
    pub async fn wait_exit(&mut self, timeout: Duration) -> Option<TerminationReason> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.try_reap() {
                Ok(Some(reason)) => return Some(reason),
                Ok(None) => {}
                Err(errno) => debug!(pid = self.pid(), %errno, "reap failed; retrying"),
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            tokio::time::sleep((deadline - now).min(REAP_POLL)).await;
        }
    }

    /// SIGKILL and reap.
    pub async fn force_kill(&mut self) -> TerminationReason {
        if let Err(errno) = self.kill() {
            debug!(pid = self.pid(), %errno, "SIGKILL failed");
        }
        self.wait_exit(KILL_WAIT)
            .await
            .unwrap_or(TerminationReason::Unknown)
    }

    /// TERMINATE, wait up to `grace`, then SIGKILL.
    pub async fn stop(&mut self, grace: Duration) -> Stopped {
        if let Err(errno) = self.terminate() {
            debug!(pid = self.pid(), %errno, "SIGTERM failed");
        }
        if let Some(reason) = self.wait_exit(grace).await {
            return Stopped {
                reason,
                forced: false,
            };
        }
        Stopped {
            reason: self.force_kill().await,
            forced: true,
        }
    }
}

impl Drop for WorkerProc {
    fn drop(&mut self) {
        if self.exit.is_some() {
            return;
        }
        let _ = signal::kill(self.pid, Signal::SIGKILL);
        if !reap_within(self.pid, DROP_REAP_WAIT) {
            warn!(pid = self.pid.as_raw(), "worker not reaped after SIGKILL; leaving it behind");
        }
    }
}

/// Non-blocking reap attempts for at most `wait`. Returns `true` once the pid
/// is collected or no longer a child.
fn reap_within(pid: Pid, wait: Duration) -> bool {
    let deadline = Instant::now() + wait;
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(Errno::EINTR) => {}
            Ok(status) if analyze_wait_status(status).is_none() => {}
            Ok(_) | Err(_) => return true,
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(1)));
    }
}
