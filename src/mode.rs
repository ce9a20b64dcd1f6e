//! # Duty-cycle modes.
//!
//! A worker runs in one of two [`Mode`]s. Each mode has a [`ModeProfile`]
//! (busy phase, idle phase) fixed at worker start. The current mode lives in a
//! [`ModeCell`], a single atomic byte that can be written from a signal
//! handler and read by the duty-cycle loop without tearing.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use serde::Deserialize;

/// Load profile of a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Long busy phase, short idle phase.
    Heavy,
    /// Short busy phase, long idle phase.
    Light,
}

impl Mode {
    /// Lowercase name used on the command line and in config files.
    pub fn as_arg(&self) -> &'static str {
        match self {
            Mode::Heavy => "heavy",
            Mode::Light => "light",
        }
    }

    const fn to_raw(self) -> u8 {
        match self {
            Mode::Heavy => 0,
            Mode::Light => 1,
        }
    }

    const fn from_raw(raw: u8) -> Mode {
        match raw {
            1 => Mode::Light,
            _ => Mode::Heavy,
        }
    }
}

impl Default for Mode {
    /// Workers start in [`Mode::Heavy`] unless told otherwise.
    fn default() -> Self {
        Mode::Heavy
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Heavy => f.write_str("HEAVY"),
            Mode::Light => f.write_str("LIGHT"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "heavy" => Ok(Mode::Heavy),
            "light" => Ok(Mode::Light),
            _ => Err(format!("unknown mode '{s}'; expected heavy or light")),
        }
    }
}

/// Busy/idle pair of one duty cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeProfile {
    /// Time spent burning CPU.
    pub busy: Duration,
    /// Time spent sleeping.
    pub idle: Duration,
}

impl ModeProfile {
    /// Builds a profile from millisecond values.
    pub const fn from_millis(busy_ms: u64, idle_ms: u64) -> Self {
        Self {
            busy: Duration::from_millis(busy_ms),
            idle: Duration::from_millis(idle_ms),
        }
    }

    /// Length of a full cycle.
    pub fn cycle(&self) -> Duration {
        self.busy + self.idle
    }
}

/// Atomically readable/writable [`Mode`].
///
/// Stores and loads are single-byte atomics, so they are safe to perform from
/// a signal handler concurrently with the main loop.
#[derive(Debug)]
pub struct ModeCell(AtomicU8);

impl ModeCell {
    /// Creates a cell holding `mode`.
    pub const fn new(mode: Mode) -> Self {
        Self(AtomicU8::new(mode.to_raw()))
    }

    /// Current mode.
    #[inline]
    pub fn load(&self) -> Mode {
        Mode::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Replaces the current mode.
    #[inline]
    pub fn store(&self, mode: Mode) {
        self.0.store(mode.to_raw(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("LIGHT".parse::<Mode>(), Ok(Mode::Light));
        assert_eq!("heavy".parse::<Mode>(), Ok(Mode::Heavy));
        assert!("medium".parse::<Mode>().is_err());
    }

    #[test]
    fn display_is_uppercase() {
        assert_eq!(Mode::Heavy.to_string(), "HEAVY");
        assert_eq!(Mode::Light.to_string(), "LIGHT");
        assert_eq!(Mode::Light.as_arg(), "light");
    }

    #[test]
    fn cell_store_is_idempotent() {
        let cell = ModeCell::new(Mode::Heavy);
        cell.store(Mode::Light);
        cell.store(Mode::Light);
        assert_eq!(cell.load(), Mode::Light);

        cell.store(Mode::Heavy);
        cell.store(Mode::Light);
        assert_eq!(cell.load(), Mode::Light);
    }

    #[test]
    fn profile_cycle_sums_phases() {
        let p = ModeProfile::from_millis(9, 1);
        assert_eq!(p.cycle(), Duration::from_millis(10));
    }
}
