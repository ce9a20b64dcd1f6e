//! # Supervisor side of the pool.
//!
//! - [`Supervisor`] / [`SupervisorBuilder`]: public entry point.
//! - [`ControlHandle`]: operator commands (broadcast, reload, shutdown).
//! - [`Launch`], [`ExecLauncher`], [`LaunchFn`]: how worker processes are created.
//! - [`SchedulingHint`]: per-slot CPU affinity and niceness.
//! - [`WorkerProc`]: owned process handle with bounded stop.
//! - [`PoolStatus`]: snapshots published on every table change.
//!
//! The slot table and the main loop live in the private `pool` module.

mod builder;
mod control;
mod launch;
pub mod os_signals;
mod pool;
mod proc;
mod runtime;
mod scheduling;
mod slot;
mod status;

pub use builder::SupervisorBuilder;
pub use control::ControlHandle;
pub use launch::{ExecLauncher, Launch, LaunchContext, LaunchFn};
pub use proc::{Stopped, TerminationReason, WorkerProc, analyze_wait_status};
pub use runtime::Supervisor;
pub use scheduling::{HintError, SchedulingHint};
pub use status::{Phase, PoolStatus, SlotPhase, SlotView};
