use std::time::Instant;

use crate::policies::RestartWindow;

use super::proc::WorkerProc;
use super::status::{SlotPhase, SlotView};
use super::SchedulingHint;

pub(crate) enum SlotState {
    Empty,
    Live(WorkerProc),
    Waiting { until: Instant },
    Failed,
}

/// One fixed position of the pool.
///
/// Created at startup and kept until shutdown; only its process handle is
/// replaced.
pub(crate) struct Slot {
    pub(crate) index: usize,
    pub(crate) hint: SchedulingHint,
    pub(crate) state: SlotState,
    pub(crate) generation: u32,
    pub(crate) restarts: RestartWindow,
    pub(crate) spawn_failures: u32,
}

impl Slot {
    pub(crate) fn new(index: usize, hint: SchedulingHint) -> Self {
        Self {
            index,
            hint,
            state: SlotState::Empty,
            generation: 0,
            restarts: RestartWindow::default(),
            spawn_failures: 0,
        }
    }

    pub(crate) fn pid(&self) -> Option<i32> {
        match &self.state {
            SlotState::Live(proc) => Some(proc.pid()),
            _ => None,
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        matches!(self.state, SlotState::Live(_))
    }

    pub(crate) fn is_failed(&self) -> bool {
        matches!(self.state, SlotState::Failed)
    }

    /// Whether the slot should be (re)spawned at `now`.
    pub(crate) fn is_due(&self, now: Instant) -> bool {
        match self.state {
            SlotState::Empty => true,
            SlotState::Waiting { until } => until <= now,
            SlotState::Live(_) | SlotState::Failed => false,
        }
    }

    /// Detaches the process handle, leaving the slot empty.
    pub(crate) fn take_proc(&mut self) -> Option<WorkerProc> {
        match std::mem::replace(&mut self.state, SlotState::Empty) {
            SlotState::Live(proc) => Some(proc),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Clears failure bookkeeping (reload).
    pub(crate) fn reset(&mut self) {
        if self.is_failed() {
            self.state = SlotState::Empty;
        }
        self.spawn_failures = 0;
        self.restarts.reset();
    }

    pub(crate) fn view(&self) -> SlotView {
        let phase = match self.state {
            SlotState::Empty => SlotPhase::Empty,
            SlotState::Live(_) => SlotPhase::Live,
            SlotState::Waiting { .. } => SlotPhase::Waiting,
            SlotState::Failed => SlotPhase::Failed,
        };
        SlotView {
            index: self.index,
            phase,
            pid: self.pid(),
            generation: self.generation,
            hint: self.hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn waiting_slot_becomes_due() {
        let now = Instant::now();
        let mut slot = Slot::new(1, SchedulingHint::default());
        assert!(slot.is_due(now));

        slot.state = SlotState::Waiting {
            until: now + Duration::from_millis(50),
        };
        assert!(!slot.is_due(now));
        assert!(slot.is_due(now + Duration::from_millis(50)));
        assert_eq!(slot.view().phase, SlotPhase::Waiting);
    }

    #[test]
    fn reset_clears_failure() {
        let mut slot = Slot::new(0, SchedulingHint::default());
        slot.state = SlotState::Failed;
        slot.spawn_failures = 5;
        assert!(!slot.is_due(Instant::now()));
        assert!(slot.take_proc().is_none());
        assert!(slot.is_failed());

        slot.reset();
        assert_eq!(slot.spawn_failures, 0);
        assert_eq!(slot.view().phase, SlotPhase::Empty);
    }
}
