//! # Worker launchers.
//!
//! A [`Launch`] implementation turns a [`LaunchContext`] (slot, mode, current
//! config) into a ready-to-spawn [`Command`]. The pool owns everything after
//! that: spawning, scheduling hints, reaping.
//!
//! - [`ExecLauncher`] runs the `poolvisor worker` subcommand (or the program
//!   configured under `[worker]`) with the per-slot arguments.
//! - [`LaunchFn`] wraps a closure; used for alternative workers and in tests.
//!
//! ## Example
//! ```rust
//! use std::process::Command;
//! use poolvisor::LaunchFn;
//!
//! let launcher = LaunchFn::arc(|ctx| {
//!     let mut cmd = Command::new("/bin/sh");
//!     cmd.arg("-c").arg("exec sleep 60");
//!     cmd.env("SLOT", ctx.slot.to_string());
//!     cmd
//! });
//! # let _ = launcher;
//! ```

use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::sync::Arc;

use nix::sys::signal::{SigmaskHow, sigprocmask};

use crate::config::Config;
use crate::mode::Mode;
use crate::worker::signals::control_set;

/// What a launcher knows about the worker it is asked to start.
#[derive(Clone, Copy, Debug)]
pub struct LaunchContext<'a> {
    /// Slot index.
    pub slot: usize,
    /// 1-based spawn count of the slot, including this one.
    pub generation: u32,
    /// Mode the pool is currently in; the worker should start in it.
    pub mode: Mode,
    /// Configuration in effect (reflects the last reload).
    pub config: &'a Config,
}

impl LaunchContext<'_> {
    /// Arguments understood by `poolvisor worker`.
    pub fn worker_args(&self) -> Vec<String> {
        let heavy = self.config.heavy;
        let light = self.config.light;
        let mut args = vec![
            "--slot".to_string(),
            self.slot.to_string(),
            "--mode".to_string(),
            self.mode.as_arg().to_string(),
        ];
        for (flag, value) in [
            ("--heavy-busy-ms", heavy.busy),
            ("--heavy-idle-ms", heavy.idle),
            ("--light-busy-ms", light.busy),
            ("--light-idle-ms", light.idle),
        ] {
            args.push(flag.to_string());
            args.push(value.as_millis().to_string());
        }
        args
    }
}

/// Builds the command for one worker process.
pub trait Launch: Send + Sync + 'static {
    /// Returns the command to spawn for `ctx`.
    ///
    /// An error counts as a spawn failure for the slot.
    fn command(&self, ctx: &LaunchContext<'_>) -> io::Result<Command>;
}

/// Launches `poolvisor worker` processes.
///
/// The control signals are blocked in the child before `exec`; the worker
/// unblocks them after installing its handlers, so a broadcast racing with
/// startup is delivered late instead of killing the worker.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecLauncher;

impl ExecLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl Launch for ExecLauncher {
    fn command(&self, ctx: &LaunchContext<'_>) -> io::Result<Command> {
        let launch = &ctx.config.worker;
        let mut cmd = match &launch.program {
            Some(program) => Command::new(program),
            None => Command::new(std::env::current_exe()?),
        };
        if launch.program.is_none() && launch.args.is_empty() {
            cmd.arg("worker");
        } else {
            cmd.args(&launch.args);
        }
        cmd.args(ctx.worker_args());

        if launch.quiet {
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        }

        // SAFETY: sigprocmask is async-signal-safe and control_set does not allocate.
        unsafe {
            cmd.pre_exec(|| {
                sigprocmask(SigmaskHow::SIG_BLOCK, Some(&control_set()), None)?;
                Ok(())
            });
        }
        Ok(cmd)
    }
}

/// Function-backed launcher.
pub struct LaunchFn<F> {
    f: F,
}

impl<F> LaunchFn<F>
where
    F: Fn(&LaunchContext<'_>) -> Command + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the launcher and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

impl<F> Launch for LaunchFn<F>
where
    F: Fn(&LaunchContext<'_>) -> Command + Send + Sync + 'static,
{
    fn command(&self, ctx: &LaunchContext<'_>) -> io::Result<Command> {
        Ok((self.f)(ctx))
    }
}
