//! # Logging subscriber.
//!
//! [`LogWriter`] renders supervisor events as structured `tracing` records.
//!
//! Levels follow the operator's point of view: a crash on its own is only
//! visible at `debug`; the restart that follows it is the `info` line.
//! Reload and shutdown phases are `info`, failures are `warn`/`error`.
//!
//! ## Output (compact formatter)
//! ```text
//! INFO  worker spawned slot=0 pid=4242 mode=HEAVY generation=1
//! DEBUG worker exited slot=0 pid=4242 status="exited with code 1"
//! INFO  worker spawned slot=0 pid=4250 mode=HEAVY generation=2
//! INFO  reload starting
//! INFO  shutdown requested
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// `tracing`-backed lifecycle logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    /// Creates a new log writer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let slot = e.slot;
        let pid = e.pid;
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::WorkerSpawned => {
                let mode = e.mode.map(|m| m.to_string()).unwrap_or_default();
                match e.attempt {
                    Some(generation) if generation > 1 => {
                        info!(?slot, ?pid, %mode, generation, "worker restarted")
                    }
                    _ => info!(?slot, ?pid, %mode, "worker spawned"),
                }
            }
            EventKind::WorkerExited => {
                debug!(?slot, ?pid, status = reason, graceful = ?e.graceful, "worker exited");
            }
            EventKind::RestartScheduled => {
                info!(?slot, delay_ms = ?e.delay_ms, step = ?e.attempt, "restart delayed");
            }
            EventKind::SpawnFailed => {
                warn!(?slot, failures = ?e.attempt, error = reason, "spawn failed");
            }
            EventKind::SlotExhausted => {
                error!(?slot, failures = ?e.attempt, "slot exhausted spawn attempts; left empty until reload");
            }
            EventKind::SchedulingSkipped => {
                warn!(?slot, ?pid, error = reason, "scheduling hint not applied");
            }
            EventKind::ModeBroadcast => {
                let mode = e.mode.map(|m| m.to_string()).unwrap_or_default();
                info!(%mode, workers = ?e.attempt, "mode broadcast");
            }
            EventKind::DeliveryFailed => {
                debug!(?slot, ?pid, error = reason, "signal delivery failed");
            }
            EventKind::ReloadStarting => info!("reload starting"),
            EventKind::ReloadSlotReplaced => info!(?slot, ?pid, "reload replaced slot"),
            EventKind::ReloadCompleted => info!(replaced = ?e.attempt, "reload completed"),
            EventKind::ConfigReloadFailed => {
                warn!(error = reason, "config reload failed; keeping previous configuration")
            }
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::AllStoppedWithin => info!("all workers stopped within grace"),
            EventKind::GraceExceeded => warn!(stuck = reason, "shutdown grace exceeded"),
            EventKind::ForceKilled => warn!(?slot, ?pid, "worker force-killed"),
            EventKind::SubscriberPanicked | EventKind::SubscriberOverflow => {
                warn!(detail = reason, kind = ?e.kind, "subscriber problem");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
