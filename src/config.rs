//! # Supervisor configuration.
//!
//! Provides [`Config`], the centralized settings for the pool, and its TOML
//! file representation.
//!
//! Config is used in three ways:
//! 1. **Startup**: `Supervisor::builder(config)`
//! 2. **Worker launch**: mode profiles and the initial mode are passed to every
//!    spawned worker on its command line
//! 3. **Reload**: the file is read again; profiles, timing and restart settings
//!    are replaced, pool size and scheduling stay fixed
//!
//! ## File format
//! Every key is optional; missing keys keep their defaults.
//! ```toml
//! workers = 3
//! initial_mode = "heavy"
//! poll_interval_ms = 100
//! grace_ms = 5000
//!
//! [heavy]
//! busy_ms = 9
//! idle_ms = 1
//!
//! [light]
//! busy_ms = 2
//! idle_ms = 8
//!
//! [restart]
//! max_restarts = 5
//! window_ms = 30000
//! max_spawn_failures = 5
//! backoff = { first_ms = 100, max_ms = 30000, factor = 2.0, jitter = "equal" }
//!
//! [scheduling]
//! cpus = [0, 1]
//! nice = [0, 10]
//! strict = false
//!
//! [worker]
//! program = "/usr/local/bin/poolvisor"
//! args = ["worker"]
//! quiet = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::mode::{Mode, ModeProfile};
use crate::policies::{BackoffPolicy, JitterPolicy, RestartPolicy};

/// Upper bound on pool size accepted from configuration.
pub const MAX_WORKERS: usize = 1024;

/// Global configuration for the supervisor runtime.
///
/// ## Field semantics
/// - `workers`: pool size N, fixed for the supervisor lifetime
/// - `grace`: how long a worker gets to exit after TERMINATE before SIGKILL
/// - `poll_interval`: upper bound on how long the main loop sleeps between wakes
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `max_spawn_failures`: consecutive failed spawns before a slot is marked failed
///
/// All fields are public; prefer the helper accessors for derived values.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Number of slots in the pool.
    pub workers: usize,

    /// Mode the pool starts in.
    pub initial_mode: Mode,

    /// Duty cycle used in [`Mode::Heavy`].
    pub heavy: ModeProfile,

    /// Duty cycle used in [`Mode::Light`].
    pub light: ModeProfile,

    /// Maximum sleep of the supervisor main loop between wakes.
    ///
    /// Child-death notifications and operator commands wake the loop earlier;
    /// the interval is the fallback that bounds restart latency if a
    /// notification is coalesced or lost.
    pub poll_interval: Duration,

    /// Grace period between TERMINATE and SIGKILL (reload and shutdown).
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,

    /// Immediate-restart budget per slot.
    pub restart: RestartPolicy,

    /// Delay growth for restarts past the budget and for spawn retries.
    pub backoff: BackoffPolicy,

    /// Consecutive spawn failures after which a slot is marked failed.
    pub max_spawn_failures: u32,

    /// CPU and niceness assignment per slot.
    pub scheduling: SchedulingConfig,

    /// How worker processes are launched.
    pub worker: LaunchConfig,
}

/// Per-slot scheduling assignment.
///
/// Slot `i` gets `cpus[i % cpus.len()]` and `nice[i % nice.len()]`; an empty
/// list disables that half of the hint. The CPU number is an index into the
/// supervisor's own allowed CPU set, taken modulo its size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulingConfig {
    /// CPU indices, cycled over slots.
    pub cpus: Vec<usize>,
    /// Niceness values, cycled over slots.
    pub nice: Vec<i32>,
    /// Treat a failure to apply a hint as a spawn failure.
    ///
    /// When `false`, the failure is logged and the worker keeps running
    /// with the inherited affinity and priority.
    pub strict: bool,
}

impl Default for SchedulingConfig {
    /// Even slots on CPU 0 at nice 0, odd slots on CPU 1 at nice 10.
    fn default() -> Self {
        Self {
            cpus: vec![0, 1],
            nice: vec![0, 10],
            strict: false,
        }
    }
}

/// How to start a worker process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Executable to run. `None` means the running `poolvisor` binary.
    pub program: Option<PathBuf>,
    /// Arguments placed before the per-slot worker arguments.
    ///
    /// Empty with `program = None` means `["worker"]`.
    pub args: Vec<String>,
    /// Discard worker stdout/stderr instead of inheriting them.
    pub quiet: bool,
}

impl Config {
    /// Reads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_toml_str(&text, path)?;
        debug!(path = %path.display(), workers = cfg.workers, "configuration loaded");
        Ok(cfg)
    }

    /// Parses and validates TOML text. `origin` is only used in error messages.
    pub fn from_toml_str(text: &str, origin: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.as_ref().to_path_buf(),
            source,
        })?;
        let cfg = file.into_config();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks every field for usable values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::invalid("workers", "must be at least 1"));
        }
        if self.workers > MAX_WORKERS {
            return Err(ConfigError::invalid(
                "workers",
                format!("must be at most {MAX_WORKERS}"),
            ));
        }
        if self.heavy.cycle().is_zero() {
            return Err(ConfigError::invalid(
                "heavy",
                "busy_ms + idle_ms must be greater than 0",
            ));
        }
        if self.light.cycle().is_zero() {
            return Err(ConfigError::invalid(
                "light",
                "busy_ms + idle_ms must be greater than 0",
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::invalid(
                "poll_interval_ms",
                "must be greater than 0",
            ));
        }
        if !self.backoff.factor.is_finite() || self.backoff.factor < 1.0 {
            return Err(ConfigError::invalid(
                "restart.backoff.factor",
                "must be a finite number >= 1.0",
            ));
        }
        if self.max_spawn_failures == 0 {
            return Err(ConfigError::invalid(
                "restart.max_spawn_failures",
                "must be at least 1",
            ));
        }
        if let Some(n) = self.scheduling.nice.iter().find(|n| !(-20..=19).contains(*n)) {
            return Err(ConfigError::invalid(
                "scheduling.nice",
                format!("{n} is outside -20..=19"),
            ));
        }
        if let Some(program) = &self.worker.program {
            if program.as_os_str().is_empty() {
                return Err(ConfigError::invalid("worker.program", "cannot be empty"));
            }
        }
        Ok(())
    }

    /// Profile for the given mode.
    #[inline]
    pub fn profile(&self, mode: Mode) -> ModeProfile {
        match mode {
            Mode::Heavy => self.heavy,
            Mode::Light => self.light,
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Applies a freshly loaded config on reload.
    ///
    /// Pool size and scheduling are fixed for the supervisor lifetime and are
    /// kept; everything else is taken from `next`. Returns the names of fixed
    /// fields whose value differed and was ignored.
    pub fn apply_reload(&mut self, next: Config) -> Vec<&'static str> {
        let mut ignored = Vec::new();
        if next.workers != self.workers {
            ignored.push("workers");
        }
        if next.scheduling != self.scheduling {
            ignored.push("scheduling");
        }

        let Config {
            initial_mode,
            heavy,
            light,
            poll_interval,
            grace,
            restart,
            backoff,
            max_spawn_failures,
            worker,
            ..
        } = next;

        self.initial_mode = initial_mode;
        self.heavy = heavy;
        self.light = light;
        self.poll_interval = poll_interval;
        self.grace = grace;
        self.restart = restart;
        self.backoff = backoff;
        self.max_spawn_failures = max_spawn_failures;
        self.worker = worker;
        ignored
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `workers = 3`
    /// - `initial_mode = Heavy`
    /// - `heavy = 9ms busy / 1ms idle`, `light = 2ms busy / 8ms idle`
    /// - `poll_interval = 100ms`
    /// - `grace = 5s`
    /// - `bus_capacity = 1024`
    /// - `restart = 5 per 30s`, `backoff = 100ms × 2^n up to 30s`
    /// - `max_spawn_failures = 5`
    fn default() -> Self {
        Self {
            workers: 3,
            initial_mode: Mode::Heavy,
            heavy: ModeProfile::from_millis(9, 1),
            light: ModeProfile::from_millis(2, 8),
            poll_interval: Duration::from_millis(100),
            grace: Duration::from_secs(5),
            bus_capacity: 1024,
            restart: RestartPolicy::default(),
            backoff: BackoffPolicy::default(),
            max_spawn_failures: 5,
            scheduling: SchedulingConfig::default(),
            worker: LaunchConfig::default(),
        }
    }
}

// ---------------------------
// File representation
// ---------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    workers: Option<usize>,
    initial_mode: Option<Mode>,
    poll_interval_ms: Option<u64>,
    grace_ms: Option<u64>,
    bus_capacity: Option<usize>,
    heavy: Option<ProfileFile>,
    light: Option<ProfileFile>,
    restart: Option<RestartFile>,
    scheduling: Option<SchedulingFile>,
    worker: Option<LaunchFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileFile {
    busy_ms: u64,
    idle_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RestartFile {
    max_restarts: Option<u32>,
    window_ms: Option<u64>,
    max_spawn_failures: Option<u32>,
    backoff: Option<BackoffFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BackoffFile {
    first_ms: Option<u64>,
    max_ms: Option<u64>,
    factor: Option<f64>,
    jitter: Option<JitterPolicy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SchedulingFile {
    cpus: Option<Vec<usize>>,
    nice: Option<Vec<i32>>,
    strict: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LaunchFile {
    program: Option<PathBuf>,
    args: Option<Vec<String>>,
    quiet: Option<bool>,
}

impl ConfigFile {
    fn into_config(self) -> Config {
        let mut cfg = Config::default();

        if let Some(n) = self.workers {
            cfg.workers = n;
        }
        if let Some(mode) = self.initial_mode {
            cfg.initial_mode = mode;
        }
        if let Some(ms) = self.poll_interval_ms {
            cfg.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.grace_ms {
            cfg.grace = Duration::from_millis(ms);
        }
        if let Some(cap) = self.bus_capacity {
            cfg.bus_capacity = cap;
        }
        if let Some(p) = self.heavy {
            cfg.heavy = ModeProfile::from_millis(p.busy_ms, p.idle_ms);
        }
        if let Some(p) = self.light {
            cfg.light = ModeProfile::from_millis(p.busy_ms, p.idle_ms);
        }

        if let Some(r) = self.restart {
            if let Some(n) = r.max_restarts {
                cfg.restart.max_restarts = n;
            }
            if let Some(ms) = r.window_ms {
                cfg.restart.window = Duration::from_millis(ms);
            }
            if let Some(n) = r.max_spawn_failures {
                cfg.max_spawn_failures = n;
            }
            if let Some(b) = r.backoff {
                if let Some(ms) = b.first_ms {
                    cfg.backoff.first = Duration::from_millis(ms);
                }
                if let Some(ms) = b.max_ms {
                    cfg.backoff.max = Duration::from_millis(ms);
                }
                if let Some(f) = b.factor {
                    cfg.backoff.factor = f;
                }
                if let Some(j) = b.jitter {
                    cfg.backoff.jitter = j;
                }
            }
        }

        if let Some(s) = self.scheduling {
            if let Some(cpus) = s.cpus {
                cfg.scheduling.cpus = cpus;
            }
            if let Some(nice) = s.nice {
                cfg.scheduling.nice = nice;
            }
            if let Some(strict) = s.strict {
                cfg.scheduling.strict = strict;
            }
        }

        if let Some(w) = self.worker {
            cfg.worker.program = w.program;
            if let Some(args) = w.args {
                cfg.worker.args = args;
            }
            if let Some(quiet) = w.quiet {
                cfg.worker.quiet = quiet;
            }
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = Config::from_toml_str("", "inline").expect("empty config");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn overrides_are_applied() {
        let text = r#"
            workers = 4
            initial_mode = "light"
            grace_ms = 250

            [heavy]
            busy_ms = 50
            idle_ms = 5

            [restart]
            max_restarts = 2
            backoff = { first_ms = 10, factor = 1.5, jitter = "equal" }

            [scheduling]
            cpus = [3]
            nice = []
        "#;
        let cfg = Config::from_toml_str(text, "inline").expect("valid config");
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.initial_mode, Mode::Light);
        assert_eq!(cfg.grace, Duration::from_millis(250));
        assert_eq!(cfg.heavy, ModeProfile::from_millis(50, 5));
        assert_eq!(cfg.light, Config::default().light);
        assert_eq!(cfg.restart.max_restarts, 2);
        assert_eq!(cfg.backoff.first, Duration::from_millis(10));
        assert_eq!(cfg.backoff.factor, 1.5);
        assert_eq!(cfg.backoff.jitter, JitterPolicy::Equal);
        assert_eq!(cfg.scheduling.cpus, vec![3]);
        assert!(cfg.scheduling.nice.is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_toml_str("wrokers = 3", "inline").unwrap_err();
        assert_eq!(err.as_label(), "config_parse");
    }

    #[test]
    fn validation_reports_field() {
        let err = Config::from_toml_str("workers = 0", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "workers", .. }));

        let err = Config::from_toml_str("[light]\nbusy_ms = 0\nidle_ms = 0", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "light", .. }));

        let err = Config::from_toml_str("[scheduling]\nnice = [25]", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "scheduling.nice", .. }));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "workers = 2\n[light]\nbusy_ms = 1\nidle_ms = 99").expect("write");
        let cfg = Config::load(file.path()).expect("load");
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.profile(Mode::Light), ModeProfile::from_millis(1, 99));
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let err = Config::load("/nonexistent/poolvisor.toml").unwrap_err();
        assert_eq!(err.as_label(), "config_read");
    }

    #[test]
    fn reload_keeps_pool_size_and_scheduling() {
        let mut current = Config::default();
        let mut next = Config::default();
        next.workers = 7;
        next.scheduling.cpus = vec![5];
        next.light = ModeProfile::from_millis(1, 1);
        next.grace = Duration::from_millis(10);

        let ignored = current.apply_reload(next);
        assert_eq!(ignored, vec!["workers", "scheduling"]);
        assert_eq!(current.workers, 3);
        assert_eq!(current.scheduling, SchedulingConfig::default());
        assert_eq!(current.light, ModeProfile::from_millis(1, 1));
        assert_eq!(current.grace, Duration::from_millis(10));
    }
}
