//! Restart and retry policies.
//!
//! These knobs decide **how fast** a slot comes back after its worker dies and
//! **when** a slot gives up on spawning.
//!
//! ## Contents
//! - [`RestartPolicy`] crash-loop window: how many immediate restarts per window
//! - [`RestartWindow`] per-slot bookkeeping for that window
//! - [`BackoffPolicy`] delay growth once a slot is crash-looping or failing to spawn
//! - [`JitterPolicy`] randomization of those delays
//!
//! ## Quick wiring
//! ```text
//! worker exits ──► RestartWindow::record(now)
//!                     ├─ within budget  ─► respawn on this wake
//!                     └─ over budget    ─► BackoffPolicy::next(excess) ─► respawn later
//!
//! spawn fails  ──► failures += 1
//!                     ├─ failures < max_spawn_failures ─► BackoffPolicy::next(failures)
//!                     └─ otherwise                    ─► slot Failed (until reload)
//! ```

mod backoff;
mod jitter;
mod restart;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use restart::{RestartPolicy, RestartWindow};
