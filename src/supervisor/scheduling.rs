//! Per-slot CPU affinity and niceness.

use nix::errno::Errno;
use nix::unistd::Pid;
use thiserror::Error;

use crate::config::SchedulingConfig;

/// Scheduling hint of a slot, derived only from its index.
///
/// The same index always yields the same hint, so a restarted worker lands
/// where its predecessor ran.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulingHint {
    /// Index into the supervisor's allowed CPU set (taken modulo its size).
    pub cpu: Option<usize>,
    /// Niceness to set on the worker.
    pub nice: Option<i32>,
}

/// A scheduling call failed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{call} failed: {errno}")]
pub struct HintError {
    pub call: &'static str,
    pub errno: Errno,
}

impl SchedulingHint {
    /// Slot `index` gets `cpus[index % len]` and `nice[index % len]`.
    pub fn for_slot(index: usize, cfg: &SchedulingConfig) -> Self {
        Self {
            cpu: cycle(&cfg.cpus, index),
            nice: cycle(&cfg.nice, index),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.nice.is_none()
    }

    /// Applies the hint to a running process.
    pub fn apply(&self, pid: i32) -> Result<(), HintError> {
        let pid = Pid::from_raw(pid);
        if let Some(cpu) = self.cpu {
            pin(pid, cpu)?;
        }
        if let Some(nice) = self.nice {
            renice(pid, nice)?;
        }
        Ok(())
    }
}

fn cycle<T: Copy>(values: &[T], index: usize) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    values.get(index % values.len()).copied()
}

#[cfg(target_os = "linux")]
fn pin(pid: Pid, cpu: usize) -> Result<(), HintError> {
    use nix::sched::{CpuSet, sched_getaffinity, sched_setaffinity};

    let allowed = sched_getaffinity(Pid::from_raw(0)).map_err(|errno| HintError {
        call: "sched_getaffinity",
        errno,
    })?;
    let usable: Vec<usize> = (0..CpuSet::count())
        .filter(|&i| allowed.is_set(i).unwrap_or(false))
        .collect();
    let Some(&target) = usable.get(cpu % usable.len().max(1)) else {
        return Ok(());
    };

    let mut set = CpuSet::new();
    set.set(target).map_err(|errno| HintError {
        call: "CpuSet::set",
        errno,
    })?;
    sched_setaffinity(pid, &set).map_err(|errno| HintError {
        call: "sched_setaffinity",
        errno,
    })
}

#[cfg(not(target_os = "linux"))]
fn pin(_pid: Pid, _cpu: usize) -> Result<(), HintError> {
    Ok(())
}

fn renice(pid: Pid, nice: i32) -> Result<(), HintError> {
    let who = libc::id_t::try_from(pid.as_raw()).map_err(|_| HintError {
        call: "setpriority",
        errno: Errno::ESRCH,
    })?;
    // SAFETY: setpriority only reads its arguments.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, who, nice) };
    if rc == -1 {
        return Err(HintError {
            call: "setpriority",
            errno: Errno::last(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn default_lists_alternate_by_parity() {
        let cfg = SchedulingConfig::default();
        let even = SchedulingHint::for_slot(4, &cfg);
        let odd = SchedulingHint::for_slot(7, &cfg);
        assert_eq!(even, SchedulingHint { cpu: Some(0), nice: Some(0) });
        assert_eq!(odd, SchedulingHint { cpu: Some(1), nice: Some(10) });
        assert_eq!(SchedulingHint::for_slot(4, &cfg), even);
    }

    #[test]
    fn empty_lists_disable_hint() {
        let cfg = SchedulingConfig {
            cpus: vec![],
            nice: vec![],
            strict: false,
        };
        let hint = SchedulingHint::for_slot(3, &cfg);
        assert!(hint.is_empty());
        assert_eq!(hint.apply(i32::MAX), Ok(()));
    }

    #[test]
    fn applies_to_own_child() {
        let mut child = Command::new("sleep").arg("5").spawn().expect("spawn sleep");
        let pid = i32::try_from(child.id()).expect("pid");

        // Raising niceness and pinning within the allowed set need no privileges.
        let hint = SchedulingHint {
            cpu: Some(0),
            nice: Some(19),
        };
        let applied = hint.apply(pid);

        let _ = child.kill();
        let _ = child.wait();
        assert_eq!(applied, Ok(()));
    }

    #[test]
    fn missing_process_is_reported() {
        let hint = SchedulingHint {
            cpu: None,
            nice: Some(5),
        };
        let err = hint.apply(i32::MAX).unwrap_err();
        assert_eq!(err.call, "setpriority");
    }
}
