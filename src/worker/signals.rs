//! Control signal installation for the worker process.
//!
//! Handlers do no I/O and take no locks: they load one pointer and perform one
//! atomic store into the installed [`ControlCells`].
//!
//! The supervisor's exec launcher blocks the control signals in the child
//! before `exec`, so signals sent while the worker is still starting stay
//! pending instead of killing it. [`install`] unblocks them once the handlers
//! are in place.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use nix::sys::signal::{
    SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal, sigaction, sigprocmask,
};

use crate::error::WorkerError;
use crate::mode::Mode;

use super::ControlCells;

/// Signal that stops the worker.
pub const TERMINATE: Signal = Signal::SIGTERM;
/// Signal that switches the worker to [`Mode::Light`].
pub const TO_LIGHT: Signal = Signal::SIGUSR1;
/// Signal that switches the worker to [`Mode::Heavy`].
pub const TO_HEAVY: Signal = Signal::SIGUSR2;

static TARGET: AtomicPtr<ControlCells> = AtomicPtr::new(ptr::null_mut());

extern "C" fn on_signal(signo: libc::c_int) {
    let cells = TARGET.load(Ordering::Acquire);
    if cells.is_null() {
        return;
    }
    // SAFETY: TARGET only ever holds a pointer derived from a `&'static ControlCells`.
    let cells = unsafe { &*cells };
    match signo {
        libc::SIGTERM => cells.terminate(),
        libc::SIGUSR1 => cells.switch(Mode::Light),
        libc::SIGUSR2 => cells.switch(Mode::Heavy),
        _ => {}
    }
}

/// The set of signals a worker reacts to.
pub fn control_set() -> SigSet {
    let mut set = SigSet::empty();
    set.add(TERMINATE);
    set.add(TO_LIGHT);
    set.add(TO_HEAVY);
    set
}

/// Routes the control signals into `cells`, ignores `SIGINT`, then unblocks
/// the control signals.
///
/// Calling it again redirects the handlers to the new cells.
pub fn install(cells: &'static ControlCells) -> Result<(), WorkerError> {
    TARGET.store(ptr::from_ref(cells).cast_mut(), Ordering::Release);

    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for (signal, name) in [
        (TERMINATE, "SIGTERM"),
        (TO_LIGHT, "SIGUSR1"),
        (TO_HEAVY, "SIGUSR2"),
    ] {
        // SAFETY: the handler only touches atomics.
        unsafe { sigaction(signal, &action) }
            .map_err(|errno| WorkerError::SignalInstall { signal: name, errno })?;
    }

    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    // SAFETY: SIG_IGN installs no code.
    unsafe { sigaction(Signal::SIGINT, &ignore) }.map_err(|errno| WorkerError::SignalInstall {
        signal: "SIGINT",
        errno,
    })?;

    sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&control_set()), None).map_err(|errno| {
        WorkerError::SignalInstall {
            signal: "sigprocmask",
            errno,
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::raise;

    // Installs process-wide handlers; kept as the only test that raises signals.
    #[test]
    fn handlers_update_installed_cells() {
        static CELLS: ControlCells = ControlCells::new(Mode::Heavy);
        install(&CELLS).expect("install");

        raise(TO_LIGHT).expect("raise SIGUSR1");
        assert_eq!(CELLS.mode(), Mode::Light);
        raise(TO_LIGHT).expect("raise SIGUSR1");
        assert_eq!(CELLS.mode(), Mode::Light);

        raise(TO_HEAVY).expect("raise SIGUSR2");
        assert_eq!(CELLS.mode(), Mode::Heavy);

        assert!(CELLS.is_running());
        raise(TERMINATE).expect("raise SIGTERM");
        assert!(!CELLS.is_running());
    }

    #[test]
    fn control_set_has_three_signals() {
        let set = control_set();
        assert!(set.contains(Signal::SIGTERM));
        assert!(set.contains(Signal::SIGUSR1));
        assert!(set.contains(Signal::SIGUSR2));
        assert!(!set.contains(Signal::SIGINT));
    }
}
