use std::sync::atomic::{AtomicBool, Ordering};

use crate::mode::{Mode, ModeCell};

/// Worker state shared between signal handlers and the duty-cycle loop.
///
/// Every operation is a single atomic load or store, so all of them may be
/// called from a signal handler. Repeated writes are idempotent.
#[derive(Debug)]
pub struct ControlCells {
    mode: ModeCell,
    running: AtomicBool,
}

impl ControlCells {
    /// Creates cells in `mode`, running.
    pub const fn new(mode: Mode) -> Self {
        Self {
            mode: ModeCell::new(mode),
            running: AtomicBool::new(true),
        }
    }

    /// Requests the loop to stop.
    #[inline]
    pub fn terminate(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Marks the worker as running again (used at start).
    #[inline]
    pub fn resume(&self) {
        self.running.store(true, Ordering::Release);
    }

    /// Switches the mode used from the next duty cycle on.
    #[inline]
    pub fn switch(&self, mode: Mode) {
        self.mode.store(mode);
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode.load()
    }
}
