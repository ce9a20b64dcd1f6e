//! # Supervisor: owns the pool, fans out events, drives shutdown.
//!
//! ```text
//! ControlHandle ──flags──► Pool::drive ──publish──► Bus ──► listener ──► SubscriberSet
//!  (OS signals,              │                                             ├─► LogWriter
//!   tests, embedders)        ├─ spawn / reap / restart                     ├─► AliveTracker
//!                            ├─ broadcast / reload                         └─► ...
//!                            └─ shutdown ──► Ok | GraceExceeded | AllSlotsFailed
//!                 watch::Receiver<PoolStatus> ◄── every table change
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use poolvisor::{Config, LogWriter, Mode, Supervisor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sup = Supervisor::builder(Config::default())
//!         .with_subscribers(vec![Arc::new(LogWriter::new())])
//!         .with_os_signals(true)
//!         .build()?;
//!
//!     let handle = sup.handle();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//!         handle.broadcast(Mode::Light);
//!     });
//!
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Config;
use crate::error::RuntimeError;
use crate::events::{Bus, Event};
use crate::subscribers::{Subscribe, SubscriberSet};

use super::builder::SupervisorBuilder;
use super::control::{ControlFlags, ControlHandle};
use super::launch::Launch;
use super::os_signals;
use super::pool::Pool;
use super::status::PoolStatus;

/// Supervises a fixed-size pool of worker processes.
pub struct Supervisor {
    pub(super) cfg: Config,
    pub(super) config_path: Option<PathBuf>,
    pub(super) launcher: Arc<dyn Launch>,
    pub(super) subscribers: Vec<Arc<dyn Subscribe>>,
    pub(super) os_signals: bool,
    pub(super) bus: Bus,
    pub(super) flags: Arc<ControlFlags>,
    pub(super) status: watch::Sender<PoolStatus>,
}

impl Supervisor {
    /// Starts building a supervisor for `cfg`.
    pub fn builder(cfg: Config) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    /// Handle for sending commands; valid before and during [`run`](Self::run).
    ///
    /// A shutdown requested before `run` makes it spawn the pool and stop it
    /// again immediately.
    pub fn handle(&self) -> ControlHandle {
        ControlHandle::new(Arc::clone(&self.flags))
    }

    /// Receiver of pool snapshots.
    pub fn status(&self) -> watch::Receiver<PoolStatus> {
        self.status.subscribe()
    }

    /// Raw event stream (in addition to subscribers).
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Spawns the pool and supervises it until shutdown completes.
    ///
    /// Returns `Ok(())` when every worker exited within the grace period,
    /// [`RuntimeError::GraceExceeded`] if some had to be killed, and
    /// [`RuntimeError::AllSlotsFailed`] if no slot could be kept alive.
    /// Subscribers have seen every event by the time this returns.
    pub async fn run(self) -> Result<(), RuntimeError> {
        let Supervisor {
            cfg,
            config_path,
            launcher,
            subscribers,
            os_signals,
            bus,
            flags,
            status,
        } = self;

        let subs = Arc::new(SubscriberSet::new(subscribers, bus.clone()));
        let stop = CancellationToken::new();
        let listener = subscriber_listener(&bus, Arc::clone(&subs), stop.clone());

        let result = async {
            let child_exits = os_signals::child_exits().map_err(RuntimeError::Signal)?;
            if os_signals {
                os_signals::forward(ControlHandle::new(Arc::clone(&flags)), stop.child_token())
                    .map_err(RuntimeError::Signal)?;
            }
            let mut pool = Pool::new(cfg, config_path, launcher, bus, flags, status);
            pool.drive(child_exits).await
        }
        .await;

        stop.cancel();
        let _ = listener.await;
        if let Ok(set) = Arc::try_unwrap(subs) {
            set.shutdown().await;
        }
        result
    }
}

/// Forwards bus events to the subscriber set until `stop`, then drains what
/// is already queued.
fn subscriber_listener(
    bus: &Bus,
    set: Arc<SubscriberSet>,
    stop: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                ev = rx.recv() => match ev {
                    Ok(ev) => set.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "event listener lagged; events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = stop.cancelled() => break,
            }
        }
        while let Ok(ev) = rx.try_recv() {
            set.emit(&ev);
        }
    })
}
