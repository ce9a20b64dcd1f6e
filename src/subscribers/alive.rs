//! # Slot liveness tracker with sequence-based ordering.
//!
//! Maintains which process currently occupies each slot, as seen through the
//! event stream, using event sequence numbers to reject stale updates.
//!
//! ## Rules
//! - `WorkerSpawned` sets the slot's pid
//! - `WorkerExited` clears it, but only if the exiting pid is still the
//!   recorded one (an exit report never clears a newer replacement)
//! - Events with `seq <= last_seq` for that slot are rejected
//! - Reads are **eventually consistent** with the supervisor's own table

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

#[derive(Debug, Clone, Copy)]
struct SlotLife {
    last_seq: u64,
    pid: Option<i32>,
    spawns: u64,
}

/// Event-fed view of which slots have a live worker.
#[derive(Debug, Default)]
pub struct AliveTracker {
    state: RwLock<HashMap<usize, SlotLife>>,
}

impl AliveTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an event; returns `true` if liveness changed.
    pub async fn update(&self, ev: &Event) -> bool {
        let Some(slot) = ev.slot else { return false };
        if !matches!(ev.kind, EventKind::WorkerSpawned | EventKind::WorkerExited) {
            return false;
        }

        let mut state = self.state.write().await;
        let entry = state.entry(slot).or_insert(SlotLife {
            last_seq: 0,
            pid: None,
            spawns: 0,
        });
        if ev.seq <= entry.last_seq {
            return false;
        }
        entry.last_seq = ev.seq;

        match ev.kind {
            EventKind::WorkerSpawned => {
                entry.pid = ev.pid;
                entry.spawns += 1;
                true
            }
            EventKind::WorkerExited if entry.pid.is_some() && entry.pid == ev.pid => {
                entry.pid = None;
                true
            }
            _ => false,
        }
    }

    /// Number of slots with a live worker.
    pub async fn live_count(&self) -> usize {
        self.state
            .read()
            .await
            .values()
            .filter(|s| s.pid.is_some())
            .count()
    }

    /// Sorted `(slot, pid)` pairs of live workers.
    pub async fn snapshot(&self) -> Vec<(usize, i32)> {
        let state = self.state.read().await;
        let mut live: Vec<(usize, i32)> = state
            .iter()
            .filter_map(|(slot, s)| s.pid.map(|pid| (*slot, pid)))
            .collect();
        live.sort_unstable();
        live
    }

    /// Total spawns observed for a slot.
    pub async fn spawns(&self, slot: usize) -> u64 {
        self.state
            .read()
            .await
            .get(&slot)
            .map(|s| s.spawns)
            .unwrap_or(0)
    }
}

#[async_trait]
impl Subscribe for AliveTracker {
    async fn on_event(&self, event: &Event) {
        self.update(event).await;
    }

    fn name(&self) -> &'static str {
        "alive-tracker"
    }
}
