//! # Crash-loop window for slot restarts.
//!
//! [`RestartPolicy`] bounds how many times a slot is restarted **immediately**
//! within a sliding window (default: 5 per 30 seconds). Restarts beyond the
//! budget are not refused, since the pool must stay at full size; they are
//! delayed by the slot's [`BackoffPolicy`](crate::BackoffPolicy).
//!
//! ```text
//! window = 30s, max_restarts = 5
//!
//! exit #1..#5 inside the window  → respawn now
//! exit #6                        → respawn after backoff.next(0)
//! exit #7                        → respawn after backoff.next(1)
//! quiet for > window             → counter resets, respawn now again
//! ```

use std::time::{Duration, Instant};

/// How many immediate restarts a slot gets per window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Immediate restarts allowed within one window.
    pub max_restarts: u32,
    /// Length of the window.
    pub window: Duration,
}

impl Default for RestartPolicy {
    /// Returns `max_restarts = 5`, `window = 30s`.
    fn default() -> Self {
        Self {
            max_restarts: 5,
            window: Duration::from_secs(30),
        }
    }
}

/// Per-slot restart bookkeeping for a [`RestartPolicy`].
#[derive(Clone, Debug, Default)]
pub struct RestartWindow {
    started: Option<Instant>,
    count: u32,
}

impl RestartWindow {
    /// Records a restart at `now`.
    ///
    /// Returns `None` if the restart is within budget, or `Some(step)` with the
    /// 0-based number of restarts past the budget, for use with
    /// [`BackoffPolicy::next`](crate::BackoffPolicy::next).
    pub fn record(&mut self, policy: &RestartPolicy, now: Instant) -> Option<u32> {
        match self.started {
            Some(start) if now.saturating_duration_since(start) < policy.window => {
                self.count = self.count.saturating_add(1);
            }
            _ => {
                self.started = Some(now);
                self.count = 1;
            }
        }

        if self.count <= policy.max_restarts {
            None
        } else {
            Some(self.count - policy.max_restarts - 1)
        }
    }

    /// Restarts recorded in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Forgets all recorded restarts (used by reload).
    pub fn reset(&mut self) {
        self.started = None;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_budget_is_immediate() {
        let policy = RestartPolicy {
            max_restarts: 3,
            window: Duration::from_secs(30),
        };
        let mut w = RestartWindow::default();
        let now = Instant::now();
        assert_eq!(w.record(&policy, now), None);
        assert_eq!(w.record(&policy, now), None);
        assert_eq!(w.record(&policy, now), None);
        assert_eq!(w.count(), 3);
    }

    #[test]
    fn excess_restarts_count_backoff_steps() {
        let policy = RestartPolicy {
            max_restarts: 2,
            window: Duration::from_secs(30),
        };
        let mut w = RestartWindow::default();
        let now = Instant::now();
        w.record(&policy, now);
        w.record(&policy, now);
        assert_eq!(w.record(&policy, now), Some(0));
        assert_eq!(w.record(&policy, now), Some(1));
    }

    #[test]
    fn window_expiry_resets_budget() {
        let policy = RestartPolicy {
            max_restarts: 1,
            window: Duration::from_millis(50),
        };
        let mut w = RestartWindow::default();
        let start = Instant::now();
        assert_eq!(w.record(&policy, start), None);
        assert_eq!(w.record(&policy, start), Some(0));
        let later = start + Duration::from_millis(60);
        assert_eq!(w.record(&policy, later), None);
        assert_eq!(w.count(), 1);
    }

    #[test]
    fn zero_budget_always_backs_off() {
        let policy = RestartPolicy {
            max_restarts: 0,
            window: Duration::from_secs(1),
        };
        let mut w = RestartWindow::default();
        assert_eq!(w.record(&policy, Instant::now()), Some(0));
    }
}
