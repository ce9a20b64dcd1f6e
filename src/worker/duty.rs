//! Duty-cycle loop.

use std::io::Write;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::WorkerError;
use crate::mode::{Mode, ModeProfile};

use super::status::{StatusLine, current_cpu};
use super::ControlCells;

/// Longest uninterrupted sleep; bounds how late a TERMINATE is noticed in the
/// idle phase.
const IDLE_SLICE: Duration = Duration::from_millis(10);

/// Startup parameters of a worker, fixed for its lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Slot index the supervisor launched this worker for.
    pub slot: usize,
    pub heavy: ModeProfile,
    pub light: ModeProfile,
    pub initial_mode: Mode,
    /// Exit abnormally after this many ticks (fault injection).
    pub crash_after: Option<u64>,
}

impl WorkerConfig {
    #[inline]
    pub fn profile(&self, mode: Mode) -> ModeProfile {
        match mode {
            Mode::Heavy => self.heavy,
            Mode::Light => self.light,
        }
    }
}

/// How the duty-cycle loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerExit {
    /// TERMINATE was received; the final status line was written.
    Graceful { ticks: u64 },
    /// `crash_after` ticks elapsed; nothing further was written.
    InjectedCrash { ticks: u64 },
}

/// The duty-cycle state machine of one worker process.
pub struct Worker<'a> {
    config: WorkerConfig,
    cells: &'a ControlCells,
    pid: u32,
    tick: u64,
}

impl<'a> Worker<'a> {
    /// Resets `cells` to the configured initial mode and marks them running.
    pub fn new(config: WorkerConfig, cells: &'a ControlCells) -> Self {
        cells.switch(config.initial_mode);
        cells.resume();
        Self {
            config,
            cells,
            pid: std::process::id(),
            tick: 0,
        }
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Runs until TERMINATE (or the injected crash), writing one status line
    /// per cycle to `sink`.
    ///
    /// The mode is read once at the start of each cycle, so a switch takes
    /// effect on the next cycle. A TERMINATE is noticed within one busy spin
    /// iteration or one idle slice.
    pub fn run<W: Write>(&mut self, sink: &mut W) -> Result<WorkerExit, WorkerError> {
        while self.cells.is_running() {
            let mode = self.cells.mode();
            let profile = self.config.profile(mode);

            if !self.burn(profile.busy) {
                break;
            }
            self.rest(profile.idle);
            self.tick += 1;

            let line = StatusLine {
                pid: self.pid,
                slot: self.config.slot,
                mode,
                tick: self.tick,
                cpu: current_cpu(),
                busy: profile.busy,
                idle: profile.idle,
                exiting: false,
            };
            writeln!(sink, "{line}")?;
            sink.flush()?;

            if self.config.crash_after.is_some_and(|limit| self.tick >= limit) {
                trace!(ticks = self.tick, "injected crash");
                return Ok(WorkerExit::InjectedCrash { ticks: self.tick });
            }
        }

        let line = StatusLine::exiting(self.pid, self.config.slot, self.cells.mode(), self.tick);
        writeln!(sink, "{line}")?;
        sink.flush()?;
        Ok(WorkerExit::Graceful { ticks: self.tick })
    }

    /// Spins for `busy`; returns `false` if stopped midway.
    fn burn(&self, busy: Duration) -> bool {
        let deadline = Instant::now() + busy;
        while Instant::now() < deadline {
            if !self.cells.is_running() {
                return false;
            }
            std::hint::spin_loop();
        }
        true
    }

    fn rest(&self, idle: Duration) {
        let deadline = Instant::now() + idle;
        loop {
            let now = Instant::now();
            if now >= deadline || !self.cells.is_running() {
                return;
            }
            std::thread::sleep((deadline - now).min(IDLE_SLICE));
        }
    }
}
