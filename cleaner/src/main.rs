mod cleanup;
mod config;
mod database;
mod scheduler;

use clap::Parser;
use config::CleanerConfig;
use database::{ConnectionAdapters, ExperimentStatus};
use scheduler::Schedulers;
use std::{path::PathBuf, process::exit, str::FromStr};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Stop the compute resources of finished experiments")]
struct Cli {
    /// path to the cleaner config
    #[arg(short, long, default_value = "cleaner.yml")]
    config: PathBuf,

    /// log the stop requests without issuing them
    #[arg(long)]
    dry_run: bool,

    /// restrict the sweep to a subset of the terminal statuses, repeatable
    #[arg(long = "status", value_parser = parse_terminal_status)]
    statuses: Vec<ExperimentStatus>,
}

fn parse_terminal_status(value: &str) -> Result<ExperimentStatus, String> {
    let status = ExperimentStatus::from_str(value)?;

    if status.is_done() {
        Ok(status)
    } else {
        Err(format!("'{status}' is not a terminal status"))
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match CleanerConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {e}");

            exit(1)
        }
    };

    if config.preflight_checks() {
        error!("Config did not pass the preflight checks, see errors above");

        exit(1)
    }

    let scheduler = if cli.dry_run {
        Schedulers::Null
    } else {
        match Schedulers::load(&config.scheduler) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                error!("Failed to load scheduler: {e}");

                exit(1)
            }
        }
    };

    let mut connection = match ConnectionAdapters::load(&config.database) {
        Ok(connection) => connection,
        Err(e) => {
            error!("Failed to open experiment store: {e}");

            exit(1)
        }
    };

    if let Err(e) = connection.init() {
        error!("Failed to initialize experiment store: {e}");

        exit(1)
    }

    let statuses = if cli.statuses.is_empty() {
        config.terminal_statuses()
    } else {
        cli.statuses
    };

    match cleanup::run(&connection, &scheduler, &statuses) {
        Ok(summary) => {
            info!(
                examined = summary.examined,
                stopped = summary.stopped,
                failed = summary.failed,
                "Cleanup sweep finished"
            );

            if let Err(e) = connection.close() {
                warn!("Failed to close experiment store: {e}");
            }
        }
        Err(e) => {
            error!("Cleanup sweep aborted: {e}");

            if let Err(e) = connection.close() {
                warn!("Failed to close experiment store: {e}");
            }

            exit(1)
        }
    }
}
