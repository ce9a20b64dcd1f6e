//! # Worker side of the pool.
//!
//! A worker is a long-running process cycling between a busy phase and an
//! idle phase. Its only inputs after start are three asynchronous signals:
//!
//! | Signal    | Effect                    |
//! |-----------|---------------------------|
//! | `SIGTERM` | stop after the current phase |
//! | `SIGUSR1` | switch to [`Mode::Light`](crate::Mode::Light) |
//! | `SIGUSR2` | switch to [`Mode::Heavy`](crate::Mode::Heavy) |
//!
//! `SIGINT` is ignored so a terminal Ctrl-C reaches only the supervisor,
//! which then drives an orderly shutdown.
//!
//! ```text
//! signal handler ──store──► ControlCells ◄──load── Worker::run
//!                           (mode, running)         busy → idle → tick → StatusLine
//! ```

mod cells;
mod duty;
pub mod signals;
mod status;

pub use cells::ControlCells;
pub use duty::{Worker, WorkerConfig, WorkerExit};
pub use status::{StatusLine, current_cpu};
