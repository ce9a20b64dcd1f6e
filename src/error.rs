//! Error types used by the poolvisor supervisor and workers.
//!
//! This module defines the error enums of the crate:
//!
//! - [`RuntimeError`]: errors raised by the supervisor runtime itself.
//! - [`SpawnError`]: a worker process could not be created for a slot.
//! - [`ConfigError`]: the configuration could not be read or is invalid.
//! - [`WorkerError`]: the worker side failed to set itself up.
//!
//! Every enum provides `as_label` for stable snake_case labels in logs.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the supervisor runtime.
///
/// None of these are raised for a crashing worker: crashes are remediated by
/// restarting the slot and only surface as events.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; the listed slots had to be force-killed.
    #[error("shutdown grace {grace:?} exceeded; force-killed slots: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Slot indices whose workers did not exit in time.
        stuck: Vec<usize>,
    },

    /// Every slot exceeded its spawn-failure budget; the pool cannot be kept alive.
    #[error("all {slots} slots exhausted their spawn attempts")]
    AllSlotsFailed {
        /// Pool size.
        slots: usize,
    },

    /// Startup configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Registering an OS signal listener failed.
    #[error("signal registration failed: {0}")]
    Signal(#[source] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use poolvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::AllSlotsFailed { .. } => "runtime_all_slots_failed",
            RuntimeError::Config(_) => "runtime_config",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}

/// # Errors produced while creating a worker process.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SpawnError {
    /// The OS refused to create the process.
    #[error("slot {slot}: failed to launch worker: {source}")]
    Launch {
        /// Slot index.
        slot: usize,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The process started but its scheduling hint could not be applied.
    #[error("slot {slot}: failed to apply scheduling hint to pid {pid}: {error}")]
    Scheduling {
        /// Slot index.
        slot: usize,
        /// Process that was started (and has been killed again).
        pid: i32,
        /// Failure description.
        error: String,
    },
}

impl SpawnError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SpawnError::Launch { .. } => "spawn_launch",
            SpawnError::Scheduling { .. } => "spawn_scheduling",
        }
    }
}

/// # Errors produced while loading configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`Config`](crate::Config).
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// A field holds an unusable value.
    #[error("invalid config field `{field}`: {reason}")]
    Invalid {
        /// Dotted field path, e.g. `heavy.busy_ms`.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "config_read",
            ConfigError::Parse { .. } => "config_parse",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// # Errors produced by the worker process.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// A control signal handler could not be installed.
    #[error("failed to install handler for {signal}: {errno}")]
    SignalInstall {
        /// Signal name.
        signal: &'static str,
        /// OS error.
        errno: nix::errno::Errno,
    },

    /// Writing the status line failed (stdout closed).
    #[error("failed to write status line: {0}")]
    Status(#[from] std::io::Error),
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::SignalInstall { .. } => "worker_signal_install",
            WorkerError::Status(_) => "worker_status",
        }
    }
}
