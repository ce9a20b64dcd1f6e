//! # Operator commands.
//!
//! Commands reach the supervisor from an asynchronous context (OS signal
//! listener, another task, a test). They never touch the pool directly: each
//! one sets a single-word flag and wakes the main loop, which consumes the
//! flags on its own control flow.
//!
//! - `shutdown` is sticky: once set it is never cleared.
//! - `reload` is a boolean; several requests before the loop wakes collapse
//!   into one reload.
//! - `broadcast` keeps only the last requested mode. LIGHT then HEAVY then
//!   LIGHT before a wake results in one LIGHT broadcast.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::sync::Notify;

use crate::mode::Mode;

const NO_MODE: u8 = 0;
const HEAVY: u8 = 1;
const LIGHT: u8 = 2;

#[derive(Debug, Default)]
pub(crate) struct ControlFlags {
    shutdown: AtomicBool,
    reload: AtomicBool,
    pending_mode: AtomicU8,
    wake: Notify,
}

impl ControlFlags {
    pub(crate) fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub(crate) fn request_reload(&self) {
        self.reload.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub(crate) fn request_mode(&self, mode: Mode) {
        let raw = match mode {
            Mode::Heavy => HEAVY,
            Mode::Light => LIGHT,
        };
        self.pending_mode.store(raw, Ordering::Release);
        self.wake.notify_one();
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Consumes a pending reload request.
    pub(crate) fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::AcqRel)
    }

    /// Consumes the pending broadcast, if any.
    pub(crate) fn take_mode(&self) -> Option<Mode> {
        match self.pending_mode.swap(NO_MODE, Ordering::AcqRel) {
            HEAVY => Some(Mode::Heavy),
            LIGHT => Some(Mode::Light),
            _ => None,
        }
    }

    /// Completes after the next request, or immediately if one arrived since
    /// the last wake.
    pub(crate) async fn notified(&self) {
        self.wake.notified().await;
    }
}

/// Cloneable handle for sending commands to a running supervisor.
///
/// All methods return immediately; the supervisor acts on the request on its
/// next wake.
#[derive(Clone, Debug)]
pub struct ControlHandle {
    flags: Arc<ControlFlags>,
}

impl ControlHandle {
    pub(crate) fn new(flags: Arc<ControlFlags>) -> Self {
        Self { flags }
    }

    /// Asks every worker to switch to `mode`.
    pub fn broadcast(&self, mode: Mode) {
        self.flags.request_mode(mode);
    }

    /// Asks for a sequential reload of the pool.
    pub fn reload(&self) {
        self.flags.request_reload();
    }

    /// Asks for shutdown. Restarts stop as soon as the request is seen.
    pub fn shutdown(&self) {
        self.flags.request_shutdown();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.flags.is_shutdown()
    }
}
