mod cli;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use poolvisor::worker::signals;
use poolvisor::{Config, ControlCells, LogWriter, Mode, Supervisor, Worker, WorkerExit};
use tracing::{debug, error};

use cli::{Cli, Commands, SuperviseArgs, WorkerArgs};
use logging::LogConfig;

/// Exit status of a worker that could not set itself up.
const WORKER_SETUP_FAILED: u8 = 2;

/// Signal handlers of the worker process write here.
static CELLS: ControlCells = ControlCells::new(Mode::Heavy);

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(
        LogConfig::from_verbosity(cli.verbose, cli.quiet)
            .with_format(cli.log_format)
            .with_env_overrides(),
    );

    match cli.command {
        Commands::Supervise(args) => match supervise(args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{err:#}");
                ExitCode::FAILURE
            }
        },
        Commands::Worker(args) => worker(args),
    }
}

fn supervise(args: SuperviseArgs) -> anyhow::Result<()> {
    let mut cfg = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(workers) = args.workers {
        cfg.workers = workers;
    }
    if let Some(mode) = args.mode {
        cfg.initial_mode = mode;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run_pool(cfg, args.config))
}

async fn run_pool(cfg: Config, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let mut builder = Supervisor::builder(cfg)
        .with_subscribers(vec![Arc::new(LogWriter::new())])
        .with_os_signals(true);
    if let Some(path) = config_path {
        builder = builder.with_config_path(path);
    }
    let sup = builder.build()?;
    sup.run().await?;
    Ok(())
}

fn worker(args: WorkerArgs) -> ExitCode {
    let mut worker = Worker::new(args.into_config(), &CELLS);
    if let Err(err) = signals::install(&CELLS) {
        error!(error = %err, label = err.as_label(), "worker setup failed");
        return ExitCode::from(WORKER_SETUP_FAILED);
    }

    let mut out = std::io::stdout().lock();
    match worker.run(&mut out) {
        Ok(WorkerExit::Graceful { ticks }) => {
            debug!(ticks, "worker stopped");
            ExitCode::SUCCESS
        }
        Ok(WorkerExit::InjectedCrash { .. }) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, label = err.as_label(), "worker failed");
            ExitCode::from(WORKER_SETUP_FAILED)
        }
    }
}
