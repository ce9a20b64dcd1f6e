//! # OS signal wiring for the supervisor process.
//!
//! [`forward`] maps operator signals onto [`ControlHandle`] requests:
//!
//! | Signal                        | Request               |
//! |-------------------------------|-----------------------|
//! | `SIGTERM`, `SIGINT`, `SIGQUIT`| shutdown              |
//! | `SIGHUP`                      | reload                |
//! | `SIGUSR1`                     | broadcast LIGHT       |
//! | `SIGUSR2`                     | broadcast HEAVY       |
//!
//! Listeners are registered before `forward` returns, so no signal sent after
//! that point is lost. Each arm only sets a flag; the pool acts on it in its
//! own loop.

use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::mode::Mode;

use super::ControlHandle;

/// Registers the operator signal listeners and spawns the forwarding task.
///
/// The task runs until `token` is cancelled. Must be called from within a
/// tokio runtime.
pub fn forward(handle: ControlHandle, token: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut hup = signal(SignalKind::hangup())?;
    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut usr2 = signal(SignalKind::user_defined2())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = term.recv() => { debug!(signal = "SIGTERM", "shutdown requested"); handle.shutdown() }
                _ = int.recv()  => { debug!(signal = "SIGINT", "shutdown requested"); handle.shutdown() }
                _ = quit.recv() => { debug!(signal = "SIGQUIT", "shutdown requested"); handle.shutdown() }
                _ = hup.recv()  => { debug!(signal = "SIGHUP", "reload requested"); handle.reload() }
                _ = usr1.recv() => handle.broadcast(Mode::Light),
                _ = usr2.recv() => handle.broadcast(Mode::Heavy),
            }
        }
    }))
}

/// Stream of child-termination notifications.
///
/// Deliveries coalesce, so one notification may stand for several exited
/// children; the pool reaps every slot on each wake.
pub(crate) fn child_exits() -> std::io::Result<Signal> {
    signal(SignalKind::child())
}
