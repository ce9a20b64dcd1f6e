use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Config;
use crate::error::RuntimeError;
use crate::events::Bus;
use crate::subscribers::Subscribe;

use super::control::ControlFlags;
use super::launch::{ExecLauncher, Launch};
use super::runtime::Supervisor;
use super::status::{Phase, PoolStatus};

/// Builder for a [`Supervisor`].
pub struct SupervisorBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    launcher: Option<Arc<dyn Launch>>,
    config_path: Option<PathBuf>,
    os_signals: bool,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            launcher: None,
            config_path: None,
            os_signals: false,
        }
    }

    /// Sets event subscribers.
    ///
    /// Each subscriber gets its own worker task and bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the default [`ExecLauncher`].
    pub fn with_launcher(mut self, launcher: Arc<dyn Launch>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// File to re-read on every reload.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Maps the supervisor process's own signals onto commands
    /// (see [`os_signals::forward`](super::os_signals::forward)).
    ///
    /// Off by default so embedding code and tests keep their signal handling.
    pub fn with_os_signals(mut self, enabled: bool) -> Self {
        self.os_signals = enabled;
        self
    }

    /// Validates the configuration and builds the supervisor.
    ///
    /// Nothing is spawned until [`Supervisor::run`].
    pub fn build(self) -> Result<Supervisor, RuntimeError> {
        self.cfg.validate()?;

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let (status, _) = watch::channel(PoolStatus {
            phase: Phase::Starting,
            mode: self.cfg.initial_mode,
            slots: Vec::new(),
        });

        Ok(Supervisor {
            cfg: self.cfg,
            config_path: self.config_path,
            launcher: self.launcher.unwrap_or_else(|| Arc::new(ExecLauncher::new())),
            subscribers: self.subscribers,
            os_signals: self.os_signals,
            bus,
            flags: Arc::new(ControlFlags::default()),
            status,
        })
    }
}
