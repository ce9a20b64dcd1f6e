//! Observable pool state, published through a `watch` channel.

use crate::mode::Mode;

use super::SchedulingHint;

/// Supervisor lifecycle phase.
///
/// ```text
/// Starting → Running ⇄ Reloading
///               │          │
///               └──► ShuttingDown ──► Stopped
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Initial pool not spawned yet.
    Starting,
    Running,
    /// Sequential reload in progress.
    Reloading,
    /// Restarts disabled, workers being terminated.
    ShuttingDown,
    /// Every worker confirmed exited.
    Stopped,
}

/// What occupies a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotPhase {
    /// A worker process is running.
    Live,
    /// No process; respawn on the next wake.
    Empty,
    /// No process; respawn after a backoff delay.
    Waiting,
    /// Spawn attempts exhausted; empty until the next reload.
    Failed,
}

/// Snapshot of one slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotView {
    pub index: usize,
    pub phase: SlotPhase,
    pub pid: Option<i32>,
    /// Successful spawns so far.
    pub generation: u32,
    pub hint: SchedulingHint,
}

/// Snapshot of the pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolStatus {
    pub phase: Phase,
    /// Mode of the last broadcast (or the initial mode).
    pub mode: Mode,
    pub slots: Vec<SlotView>,
}

impl PoolStatus {
    /// Number of slots with a running worker.
    pub fn live_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.phase == SlotPhase::Live)
            .count()
    }

    /// Live pids in slot order.
    pub fn pids(&self) -> Vec<i32> {
        self.slots.iter().filter_map(|s| s.pid).collect()
    }
}
