//! # Pool engine: the supervisor's single control flow.
//!
//! [`Pool`] owns the slot table and performs every spawn, reap, signal and
//! table mutation. Nothing else touches the slots; requests from other
//! contexts arrive through [`ControlFlags`].
//!
//! ## Main loop
//! ```text
//! spawn all slots
//! loop {
//!     shutdown flag?      → break
//!     pending mode?       → broadcast
//!     reload flag?        → reload (slot by slot), continue
//!     reap every slot     → schedule restarts
//!     respawn due slots
//!     all slots failed?   → fatal, break
//!     wait: command | SIGCHLD | next backoff deadline | poll interval
//! }
//! shutdown
//! ```
//!
//! ## Rules
//! - Each process is reaped once and its slot refilled once: no double restart.
//! - Once the shutdown flag is seen, no slot is respawned except the one a
//!   reload is currently replacing.
//! - Reload keeps at most one slot down at a time.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::signal::unix::Signal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{RuntimeError, SpawnError};
use crate::events::{Bus, Event, EventKind};
use crate::mode::Mode;
use crate::worker::signals::{TO_HEAVY, TO_LIGHT};

use super::control::ControlFlags;
use super::launch::{Launch, LaunchContext};
use super::proc::{REAP_POLL, WorkerProc};
use super::slot::{Slot, SlotState};
use super::status::{Phase, PoolStatus};
use super::SchedulingHint;

pub(crate) struct Pool {
    cfg: Config,
    config_path: Option<PathBuf>,
    launcher: Arc<dyn Launch>,
    bus: Bus,
    flags: Arc<ControlFlags>,
    status: watch::Sender<PoolStatus>,
    slots: Vec<Slot>,
    mode: Mode,
    phase: Phase,
}

impl Pool {
    pub(crate) fn new(
        cfg: Config,
        config_path: Option<PathBuf>,
        launcher: Arc<dyn Launch>,
        bus: Bus,
        flags: Arc<ControlFlags>,
        status: watch::Sender<PoolStatus>,
    ) -> Self {
        let slots = (0..cfg.workers)
            .map(|i| Slot::new(i, SchedulingHint::for_slot(i, &cfg.scheduling)))
            .collect();
        Self {
            mode: cfg.initial_mode,
            cfg,
            config_path,
            launcher,
            bus,
            flags,
            status,
            slots,
            phase: Phase::Starting,
        }
    }

    /// Runs the pool until shutdown completes.
    pub(crate) async fn drive(&mut self, mut child_exits: Signal) -> Result<(), RuntimeError> {
        for index in 0..self.slots.len() {
            self.spawn_slot(index);
        }
        self.set_phase(Phase::Running);
        info!(workers = self.slots.len(), mode = %self.mode, "pool started");

        let flags = Arc::clone(&self.flags);
        let mut fatal = None;
        loop {
            if flags.is_shutdown() {
                break;
            }
            if let Some(mode) = flags.take_mode() {
                self.broadcast(mode);
            }
            if flags.take_reload() {
                self.reload().await;
                continue;
            }

            self.reap_all();
            self.respawn_due();
            if self.slots.iter().all(Slot::is_failed) {
                fatal = Some(RuntimeError::AllSlotsFailed {
                    slots: self.slots.len(),
                });
                flags.request_shutdown();
                break;
            }
            self.publish_status();

            let wake = self.next_wake();
            tokio::select! {
                _ = flags.notified() => {}
                _ = child_exits.recv() => {}
                _ = tokio::time::sleep(wake) => {}
            }
        }

        let stopped = self.shutdown().await;
        match fatal {
            Some(err) => Err(err),
            None => stopped,
        }
    }

    // ---------------------------
    // Spawning
    // ---------------------------

    /// Creates a process for `index`, replacing whatever the slot held.
    ///
    /// Failures are handled here (retry with backoff, or mark the slot
    /// failed); returns the new pid on success.
    fn spawn_slot(&mut self, index: usize) -> Option<i32> {
        match self.try_spawn(index) {
            Ok(pid) => Some(pid),
            Err(err) => {
                self.spawn_failed(index, err);
                None
            }
        }
    }

    fn try_spawn(&mut self, index: usize) -> Result<i32, SpawnError> {
        // A stale handle is killed and reaped by its Drop.
        drop(self.slots[index].take_proc());

        let generation = self.slots[index].generation.saturating_add(1);
        let ctx = LaunchContext {
            slot: index,
            generation,
            mode: self.mode,
            config: &self.cfg,
        };
        let mut cmd = self
            .launcher
            .command(&ctx)
            .map_err(|source| SpawnError::Launch { slot: index, source })?;
        cmd.stdin(Stdio::null());
        let proc = WorkerProc::spawn(&mut cmd)
            .map_err(|source| SpawnError::Launch { slot: index, source })?;
        let pid = proc.pid();

        if let Err(err) = self.slots[index].hint.apply(pid) {
            if self.cfg.scheduling.strict {
                drop(proc);
                return Err(SpawnError::Scheduling {
                    slot: index,
                    pid,
                    error: err.to_string(),
                });
            }
            self.bus.publish(
                Event::new(EventKind::SchedulingSkipped)
                    .with_slot(index)
                    .with_pid(pid)
                    .with_reason(err.to_string()),
            );
        }

        let slot = &mut self.slots[index];
        slot.generation = generation;
        slot.spawn_failures = 0;
        slot.state = SlotState::Live(proc);

        self.bus.publish(
            Event::new(EventKind::WorkerSpawned)
                .with_slot(index)
                .with_pid(pid)
                .with_mode(self.mode)
                .with_attempt(generation),
        );
        Ok(pid)
    }

    fn spawn_failed(&mut self, index: usize, err: SpawnError) {
        let now = Instant::now();
        let max = self.cfg.max_spawn_failures;
        let slot = &mut self.slots[index];
        slot.spawn_failures = slot.spawn_failures.saturating_add(1);
        let failures = slot.spawn_failures;

        self.bus.publish(
            Event::new(EventKind::SpawnFailed)
                .with_slot(index)
                .with_attempt(failures)
                .with_reason(err.to_string()),
        );

        if failures >= max {
            slot.state = SlotState::Failed;
            self.bus.publish(
                Event::new(EventKind::SlotExhausted)
                    .with_slot(index)
                    .with_attempt(failures),
            );
            return;
        }

        let delay = self.cfg.backoff.next(failures - 1);
        slot.state = SlotState::Waiting { until: now + delay };
        self.bus.publish(
            Event::new(EventKind::RestartScheduled)
                .with_slot(index)
                .with_delay(delay)
                .with_attempt(failures),
        );
    }

    /// Spawns every slot whose restart is due. Disabled once shutdown was requested.
    fn respawn_due(&mut self) {
        if self.flags.is_shutdown() {
            return;
        }
        let now = Instant::now();
        for index in 0..self.slots.len() {
            if self.slots[index].is_due(now) {
                self.spawn_slot(index);
            }
        }
    }

    // ---------------------------
    // Reaping
    // ---------------------------

    /// Collects every exited worker and schedules its restart.
    fn reap_all(&mut self) {
        for index in 0..self.slots.len() {
            let SlotState::Live(proc) = &mut self.slots[index].state else {
                continue;
            };
            let pid = proc.pid();
            match proc.try_reap() {
                Ok(None) => {}
                Ok(Some(reason)) => {
                    self.slots[index].state = SlotState::Empty;
                    self.bus.publish(
                        Event::new(EventKind::WorkerExited)
                            .with_slot(index)
                            .with_pid(pid)
                            .with_graceful(reason.is_success())
                            .with_reason(reason.to_string()),
                    );
                    self.schedule_restart(index);
                }
                Err(errno) => {
                    warn!(slot = index, pid, %errno, "waitpid failed; assuming worker is alive");
                }
            }
        }
    }

    /// Decides when an emptied slot comes back.
    ///
    /// Within the restart budget the slot stays `Empty` and is respawned on
    /// this wake; past it the slot waits for a backoff delay.
    fn schedule_restart(&mut self, index: usize) {
        if self.flags.is_shutdown() {
            return;
        }
        let now = Instant::now();
        let slot = &mut self.slots[index];
        let Some(step) = slot.restarts.record(&self.cfg.restart, now) else {
            return;
        };
        let delay = self.cfg.backoff.next(step);
        slot.state = SlotState::Waiting { until: now + delay };
        self.bus.publish(
            Event::new(EventKind::RestartScheduled)
                .with_slot(index)
                .with_delay(delay)
                .with_attempt(step.saturating_add(1)),
        );
    }

    // ---------------------------
    // Commands
    // ---------------------------

    /// Signals every live worker to switch to `mode`.
    ///
    /// A failed delivery is reported and skipped; the broadcast continues.
    fn broadcast(&mut self, mode: Mode) {
        self.mode = mode;
        let sig = match mode {
            Mode::Light => TO_LIGHT,
            Mode::Heavy => TO_HEAVY,
        };

        let mut delivered = 0u32;
        for slot in &self.slots {
            let SlotState::Live(proc) = &slot.state else {
                continue;
            };
            match proc.signal(sig) {
                Ok(()) => delivered += 1,
                Err(errno) => self.bus.publish(
                    Event::new(EventKind::DeliveryFailed)
                        .with_slot(slot.index)
                        .with_pid(proc.pid())
                        .with_reason(errno.to_string()),
                ),
            }
        }

        self.bus.publish(
            Event::new(EventKind::ModeBroadcast)
                .with_mode(mode)
                .with_attempt(delivered),
        );
        self.publish_status();
    }

    /// Replaces every slot in order: stop the old process, spawn its
    /// replacement, then move on.
    ///
    /// A shutdown request is honoured between slots; the slot being replaced
    /// when it arrives is still respawned.
    async fn reload(&mut self) {
        self.set_phase(Phase::Reloading);
        self.bus.publish(Event::new(EventKind::ReloadStarting));
        self.reread_config();
        for slot in &mut self.slots {
            slot.reset();
        }

        let mut replaced = 0u32;
        for index in 0..self.slots.len() {
            if self.flags.is_shutdown() {
                debug!(slot = index, "reload interrupted by shutdown");
                break;
            }
            if let Some(mode) = self.flags.take_mode() {
                self.broadcast(mode);
            }

            if let Some(mut proc) = self.slots[index].take_proc() {
                let pid = proc.pid();
                let stopped = proc.stop(self.cfg.grace).await;
                if stopped.forced {
                    self.bus.publish(
                        Event::new(EventKind::ForceKilled)
                            .with_slot(index)
                            .with_pid(pid),
                    );
                }
                self.bus.publish(
                    Event::new(EventKind::WorkerExited)
                        .with_slot(index)
                        .with_pid(pid)
                        .with_graceful(stopped.reason.is_success())
                        .with_reason(stopped.reason.to_string()),
                );
            }

            if let Some(pid) = self.spawn_slot(index) {
                replaced += 1;
                self.bus.publish(
                    Event::new(EventKind::ReloadSlotReplaced)
                        .with_slot(index)
                        .with_pid(pid),
                );
            }

            // Keep the rest of the pool whole while the reload walks on.
            self.reap_all();
            self.respawn_due();
            self.publish_status();
        }

        self.bus
            .publish(Event::new(EventKind::ReloadCompleted).with_attempt(replaced));
        self.set_phase(Phase::Running);
    }

    fn reread_config(&mut self) {
        let Some(path) = &self.config_path else {
            return;
        };
        match Config::load(path) {
            Ok(next) => {
                let ignored = self.cfg.apply_reload(next);
                if !ignored.is_empty() {
                    warn!(fields = ?ignored, "changes to fixed settings are ignored until restart");
                }
                info!(path = %path.display(), "configuration reloaded");
            }
            Err(err) => self.bus.publish(
                Event::new(EventKind::ConfigReloadFailed).with_reason(err.to_string()),
            ),
        }
    }

    /// Terminates every worker and waits for all of them.
    ///
    /// Workers still running after the grace period are killed; the call
    /// returns only when every slot is confirmed empty.
    async fn shutdown(&mut self) -> Result<(), RuntimeError> {
        self.flags.request_shutdown();
        self.set_phase(Phase::ShuttingDown);
        self.bus.publish(Event::new(EventKind::ShutdownRequested));

        for slot in &mut self.slots {
            if matches!(slot.state, SlotState::Waiting { .. }) {
                slot.state = SlotState::Empty;
            }
            let SlotState::Live(proc) = &slot.state else {
                continue;
            };
            if let Err(errno) = proc.terminate() {
                self.bus.publish(
                    Event::new(EventKind::DeliveryFailed)
                        .with_slot(slot.index)
                        .with_pid(proc.pid())
                        .with_reason(errno.to_string()),
                );
            }
        }

        let grace = self.cfg.grace;
        let deadline = Instant::now() + grace;
        loop {
            self.reap_all();
            if !self.slots.iter().any(Slot::is_live) {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep((deadline - now).min(REAP_POLL)).await;
        }

        let mut stuck = Vec::new();
        for index in 0..self.slots.len() {
            let Some(mut proc) = self.slots[index].take_proc() else {
                continue;
            };
            let pid = proc.pid();
            stuck.push(index);
            let reason = proc.force_kill().await;
            self.bus.publish(
                Event::new(EventKind::ForceKilled)
                    .with_slot(index)
                    .with_pid(pid),
            );
            self.bus.publish(
                Event::new(EventKind::WorkerExited)
                    .with_slot(index)
                    .with_pid(pid)
                    .with_graceful(false)
                    .with_reason(reason.to_string()),
            );
        }

        self.set_phase(Phase::Stopped);
        if stuck.is_empty() {
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
            Ok(())
        } else {
            self.bus.publish(
                Event::new(EventKind::GraceExceeded).with_reason(format!("slots {stuck:?}")),
            );
            Err(RuntimeError::GraceExceeded { grace, stuck })
        }
    }

    // ---------------------------
    // Status
    // ---------------------------

    /// Sleep bound: the poll interval or the earliest backoff deadline.
    fn next_wake(&self) -> Duration {
        let now = Instant::now();
        self.slots
            .iter()
            .filter_map(|slot| match slot.state {
                SlotState::Waiting { until } => Some(until.saturating_duration_since(now)),
                _ => None,
            })
            .fold(self.cfg.poll_interval, Duration::min)
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status.send_replace(PoolStatus {
            phase: self.phase,
            mode: self.mode,
            slots: self.slots.iter().map(Slot::view).collect(),
        });
    }
}
