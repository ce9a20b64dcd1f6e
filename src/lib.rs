//! # poolvisor
//!
//! **poolvisor** keeps a fixed-size pool of long-running worker processes
//! alive. It restarts workers that die, broadcasts operating-mode changes
//! (HEAVY / LIGHT duty cycle) to the whole pool with signals, replaces the
//! pool slot by slot on reload, and shuts down without racing its own
//! restart logic.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   operator (SIGUSR1/SIGUSR2/SIGHUP/SIGTERM)   embedder / tests
//!                  │                                  │
//!                  ▼                                  ▼
//!          os_signals::forward ──────────►  ControlHandle
//!                                                │ flags + wake
//!                                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor::run  (one control flow)                              │
//! │  - Pool: slot table, spawn / reap / restart / broadcast / reload  │
//! │  - SIGCHLD listener + poll interval wake the loop                 │
//! │  - watch::Sender<PoolStatus>                                      │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        │ SIGTERM/USR1/USR2│                  │               │ publish(Event)
//!        ▼                  ▼                  ▼               ▼
//!   ┌──────────┐       ┌──────────┐       ┌──────────┐   ┌──────────────┐
//!   │ worker 0 │       │ worker 1 │  ...  │worker N-1│   │ Bus          │
//!   │ cpu 0    │       │ cpu 1    │       │          │   └──────┬───────┘
//!   │ nice 0   │       │ nice 10  │       │          │          ▼
//!   └──────────┘       └──────────┘       └──────────┘   SubscriberSet
//!   busy → idle → tick → status line                      ├─► LogWriter
//!                                                          └─► AliveTracker
//! ```
//!
//! ### Slot lifecycle
//! ```text
//! Empty ──spawn ok──► Live ──exit reaped──► Empty (within restart budget)
//!   │                  ▲                  └► Waiting(backoff) ──due──► spawn
//!   └─spawn error──► Waiting ── failures ≥ max ──► Failed ──reload──► Empty
//! ```
//!
//! ## Features
//! | Area              | Description                                         | Key types                                |
//! |-------------------|-----------------------------------------------------|------------------------------------------|
//! | **Supervision**   | Fixed pool, restart, reload, shutdown               | [`Supervisor`], [`ControlHandle`]        |
//! | **Workers**       | Duty-cycle loop driven by signal-set atomics        | [`Worker`], [`ControlCells`]             |
//! | **Launching**     | How worker processes are built                      | [`Launch`], [`ExecLauncher`], [`LaunchFn`] |
//! | **Policies**      | Crash-loop window and backoff                       | [`RestartPolicy`], [`BackoffPolicy`]     |
//! | **Subscriber API**| Hook into lifecycle events                          | [`Subscribe`], [`LogWriter`]             |
//! | **Configuration** | TOML file with defaults and validation              | [`Config`]                               |
//! | **Errors**        | Typed errors with stable labels                     | [`RuntimeError`], [`SpawnError`]         |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use poolvisor::{AliveTracker, Config, LogWriter, Subscribe, Supervisor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.workers = 4;
//!
//!     let alive = Arc::new(AliveTracker::new());
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new()), alive.clone()];
//!
//!     let sup = Supervisor::builder(cfg)
//!         .with_subscribers(subs)
//!         .with_os_signals(true)
//!         .build()?;
//!
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod events;
mod mode;
mod policies;
mod subscribers;
pub mod supervisor;
pub mod worker;

// ---- Public re-exports ----

pub use config::{Config, LaunchConfig, MAX_WORKERS, SchedulingConfig};
pub use error::{ConfigError, RuntimeError, SpawnError, WorkerError};
pub use events::{Bus, Event, EventKind};
pub use mode::{Mode, ModeCell, ModeProfile};
pub use policies::{BackoffPolicy, JitterPolicy, RestartPolicy, RestartWindow};
pub use subscribers::{AliveTracker, LogWriter, Subscribe, SubscriberSet};
pub use supervisor::{
    ControlHandle, ExecLauncher, Launch, LaunchContext, LaunchFn, Phase, PoolStatus,
    SchedulingHint, SlotPhase, SlotView, Supervisor, SupervisorBuilder, TerminationReason,
    WorkerProc,
};
pub use worker::{ControlCells, StatusLine, Worker, WorkerConfig, WorkerExit};
