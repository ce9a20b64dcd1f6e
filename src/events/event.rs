//! # Lifecycle events emitted by the supervisor.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Slot events**: a worker was spawned, exited, or could not be spawned
//! - **Command events**: mode broadcast, reload progress
//! - **Shutdown events**: requested, completed within grace, grace exceeded
//! - **Subscriber events**: overflow/panic of a subscriber worker
//!
//! The [`Event`] struct carries the metadata (slot, pid, mode, reason, delay).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use poolvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RestartScheduled)
//!     .with_slot(2)
//!     .with_delay(Duration::from_millis(400))
//!     .with_attempt(7);
//!
//! assert_eq!(ev.kind, EventKind::RestartScheduled);
//! assert_eq!(ev.slot, Some(2));
//! assert_eq!(ev.delay_ms, Some(400));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::mode::Mode;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Classification of supervisor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Slot events ===
    /// A worker process was started for a slot.
    ///
    /// Sets: `slot`, `pid`, `mode`, `attempt` (slot generation).
    WorkerSpawned,

    /// A worker process exited and was reaped.
    ///
    /// Sets: `slot`, `pid`, `reason` (termination description), `graceful`.
    WorkerExited,

    /// A slot's respawn was deferred (crash loop or spawn retry).
    ///
    /// Sets: `slot`, `delay_ms`, `attempt` (backoff step + 1).
    RestartScheduled,

    /// Creating a worker process failed.
    ///
    /// Sets: `slot`, `reason`, `attempt` (consecutive failures).
    SpawnFailed,

    /// A slot exceeded its spawn-failure budget and stays empty until reload.
    ///
    /// Sets: `slot`, `attempt`.
    SlotExhausted,

    /// A scheduling hint could not be applied (non-strict mode).
    ///
    /// Sets: `slot`, `pid`, `reason`.
    SchedulingSkipped,

    // === Command events ===
    /// A mode switch was sent to every live worker.
    ///
    /// Sets: `mode`, `attempt` (number of workers signalled).
    ModeBroadcast,

    /// Delivering a control signal to a worker failed.
    ///
    /// Sets: `slot`, `pid`, `reason`.
    DeliveryFailed,

    /// Sequential reload began.
    ReloadStarting,

    /// One slot was drained and respawned during reload.
    ///
    /// Sets: `slot`, `pid` (new process).
    ReloadSlotReplaced,

    /// Reload finished (or stopped early because shutdown was requested).
    ///
    /// Sets: `attempt` (slots replaced).
    ReloadCompleted,

    /// Re-reading the config file failed; the previous configuration stays.
    ///
    /// Sets: `reason`.
    ConfigReloadFailed,

    // === Shutdown events ===
    /// Shutdown requested; no further restarts will happen.
    ShutdownRequested,

    /// Every worker exited within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; remaining workers were force-killed.
    ///
    /// Sets: `reason` (stuck slots).
    GraceExceeded,

    /// A worker ignored TERMINATE for the whole grace period and got SIGKILL.
    ///
    /// Sets: `slot`, `pid`.
    ForceKilled,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `reason` (subscriber name + panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason`.
    SubscriberOverflow,
}

/// Supervisor event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Slot index, if applicable.
    pub slot: Option<usize>,
    /// Worker process id, if applicable.
    pub pid: Option<i32>,
    /// Mode involved (broadcast target, spawn mode).
    pub mode: Option<Mode>,
    /// Human-readable reason (errors, termination description).
    pub reason: Option<Arc<str>>,
    /// Delay before the next spawn in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Counter attached to the event (generation, failures, workers signalled).
    pub attempt: Option<u32>,
    /// Whether a worker exit had success status.
    pub graceful: Option<bool>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            slot: None,
            pid: None,
            mode: None,
            reason: None,
            delay_ms: None,
            attempt: None,
            graceful: None,
        }
    }

    /// Attaches a slot index.
    #[inline]
    pub fn with_slot(mut self, slot: usize) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Attaches a process id.
    #[inline]
    pub fn with_pid(mut self, pid: i32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches a mode.
    #[inline]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a counter.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Marks whether an exit was graceful.
    #[inline]
    pub fn with_graceful(mut self, graceful: bool) -> Self {
        self.graceful = Some(graceful);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} panic={info}"))
    }
}
