use std::fmt;
use std::time::Duration;

use crate::mode::Mode;

/// One line of worker diagnostic output.
///
/// Emitted once per duty cycle and once more on graceful exit. The format is
/// for humans; nothing parses it except tests.
///
/// ```text
/// worker slot=1 pid=4242 mode=LIGHT tick=17 cpu=1 busy=2ms idle=8ms
/// worker slot=1 pid=4242 mode=LIGHT tick=17 exiting gracefully
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusLine {
    pub pid: u32,
    pub slot: usize,
    pub mode: Mode,
    pub tick: u64,
    /// CPU the worker last ran on, if the platform reports it.
    pub cpu: Option<usize>,
    pub busy: Duration,
    pub idle: Duration,
    /// Final line written after the loop stopped.
    pub exiting: bool,
}

impl StatusLine {
    /// Final "exiting gracefully" line.
    pub fn exiting(pid: u32, slot: usize, mode: Mode, tick: u64) -> Self {
        Self {
            pid,
            slot,
            mode,
            tick,
            cpu: None,
            busy: Duration::ZERO,
            idle: Duration::ZERO,
            exiting: true,
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "worker slot={} pid={} mode={} tick={}",
            self.slot, self.pid, self.mode, self.tick
        )?;
        if self.exiting {
            return f.write_str(" exiting gracefully");
        }
        match self.cpu {
            Some(cpu) => write!(f, " cpu={cpu}")?,
            None => f.write_str(" cpu=?")?,
        }
        write!(
            f,
            " busy={}ms idle={}ms",
            self.busy.as_millis(),
            self.idle.as_millis()
        )
    }
}

/// CPU the calling thread is running on.
#[cfg(target_os = "linux")]
pub fn current_cpu() -> Option<usize> {
    // SAFETY: sched_getcpu has no preconditions.
    let cpu = unsafe { libc::sched_getcpu() };
    usize::try_from(cpu).ok()
}

/// CPU the calling thread is running on.
#[cfg(not(target_os = "linux"))]
pub fn current_cpu() -> Option<usize> {
    None
}
