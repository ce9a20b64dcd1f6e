//! Command-line interface definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use poolvisor::{Mode, ModeProfile, WorkerConfig};

use crate::logging::LogFormat;

/// Supervisor for a fixed-size pool of duty-cycle workers.
#[derive(Parser, Debug)]
#[command(name = "poolvisor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except errors.
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    /// Log output format.
    #[arg(long, value_enum, env = "POOLVISOR_LOG_FORMAT", default_value_t = LogFormat::Compact, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the worker pool until SIGTERM/SIGINT.
    ///
    /// SIGUSR1 switches every worker to LIGHT, SIGUSR2 to HEAVY, SIGHUP
    /// reloads the pool one slot at a time.
    Supervise(SuperviseArgs),

    /// Run a single worker (started by the supervisor).
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// Arguments for the supervise command.
#[derive(Parser, Debug)]
pub struct SuperviseArgs {
    /// TOML configuration file; re-read on reload.
    #[arg(short, long, env = "POOLVISOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Pool size (overrides the config file).
    #[arg(short = 'n', long)]
    pub workers: Option<usize>,

    /// Initial mode: heavy or light (overrides the config file).
    #[arg(short, long)]
    pub mode: Option<Mode>,
}

/// Arguments for the worker command.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Slot index this worker fills.
    #[arg(long, default_value_t = 0)]
    pub slot: usize,

    /// Initial mode.
    #[arg(long, default_value_t = Mode::Heavy)]
    pub mode: Mode,

    #[arg(long, default_value_t = 9)]
    pub heavy_busy_ms: u64,

    #[arg(long, default_value_t = 1)]
    pub heavy_idle_ms: u64,

    #[arg(long, default_value_t = 2)]
    pub light_busy_ms: u64,

    #[arg(long, default_value_t = 8)]
    pub light_idle_ms: u64,

    /// Exit with status 1 after this many ticks.
    #[arg(long)]
    pub crash_after: Option<u64>,
}

impl WorkerArgs {
    pub fn into_config(self) -> WorkerConfig {
        WorkerConfig {
            slot: self.slot,
            heavy: ModeProfile::from_millis(self.heavy_busy_ms, self.heavy_idle_ms),
            light: ModeProfile::from_millis(self.light_busy_ms, self.light_idle_ms),
            initial_mode: self.mode,
            crash_after: self.crash_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_worker_arguments() {
        let cli = Cli::try_parse_from([
            "poolvisor", "worker", "--slot", "2", "--mode", "light", "--light-idle-ms", "30",
            "--crash-after", "4",
        ])
        .expect("parse");
        let Commands::Worker(args) = cli.command else {
            panic!("expected worker command");
        };
        let config = args.into_config();
        assert_eq!(config.slot, 2);
        assert_eq!(config.initial_mode, Mode::Light);
        assert_eq!(config.light, ModeProfile::from_millis(2, 30));
        assert_eq!(config.heavy, ModeProfile::from_millis(9, 1));
        assert_eq!(config.crash_after, Some(4));
    }

    #[test]
    fn parses_supervise_overrides() {
        let cli = Cli::try_parse_from(["poolvisor", "-v", "supervise", "-n", "5", "--mode", "LIGHT"])
            .expect("parse");
        assert_eq!(cli.verbose, 1);
        let Commands::Supervise(args) = cli.command else {
            panic!("expected supervise command");
        };
        assert_eq!(args.workers, Some(5));
        assert_eq!(args.mode, Some(Mode::Light));
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["poolvisor", "worker", "--mode", "medium"]).is_err());
    }
}
