use crate::database::{ExperimentStatus, DONE_STATUS};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap, fs::File, io::Error, os::unix::fs::MetadataExt, path::PathBuf,
    str::FromStr,
};
use thiserror::Error;
use tracing::{error, warn};

// check if a file is executable
pub fn check_executable(path: &PathBuf) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound)
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Scheduler not supported")]
    UnsupportedScheduler(String),
    #[error("Scheduler failed to load")]
    FailedLoadScheduler,
    #[error("Failed to parse config file")]
    ParseFailed(#[from] serde_yaml::Error),
    #[error("File not found")]
    FileNotFound,
    #[error("Metadata not found")]
    MetadataNotFound(#[from] Error),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct CleanerConfig {
    // scheduler the stop requests are sent to
    pub scheduler: SchedulerConfig,

    #[serde(alias = "db")]
    pub database: DatabaseConfig,

    // tuning for the cleanup sweep itself
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_adapter")]
    pub adapter: String,
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    // Name of the selected scheduler, see Schedulers::load for the selection proccess
    pub name: String,
    // parameters for the scheduler that apply over all experiments
    // TODO: Make this fully typed with an enum
    pub parameter: Option<BTreeMap<String, serde_yaml::Value>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct CleanupConfig {
    // Subset of the terminal statuses the sweep is restricted to.
    // An empty list means all of DONE_STATUS.
    #[serde(default)]
    pub statuses: Vec<String>,

    #[serde(default, skip)]
    resolved: Vec<ExperimentStatus>,
}

impl CleanerConfig {
    pub fn load(path: &PathBuf) -> Result<Self, ConfigErrors> {
        match File::open(path) {
            Ok(file) => Ok(serde_yaml::from_reader(file)?),
            Err(error) => {
                error!(
                    "Failed to open config at {}: {error}",
                    path.to_string_lossy()
                );

                Err(ConfigErrors::FileNotFound)
            }
        }
    }

    /// statuses the sweep acts on, after `preflight_checks` resolved them
    pub fn terminal_statuses(&self) -> Vec<ExperimentStatus> {
        if self.cleanup.resolved.is_empty() {
            DONE_STATUS.to_vec()
        } else {
            self.cleanup.resolved.clone()
        }
    }

    pub fn preflight_checks(&mut self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        self.database.adapter = self.database.adapter.to_lowercase();
        if self.database.adapter != "sqlite" {
            error!(
                "database.adapter ({}) is not supported, please use `sqlite` for now",
                self.database.adapter
            );
            contains_error = true;
        }

        self.scheduler.name = self.scheduler.name.to_lowercase();
        match self.scheduler.name.as_str() {
            "exec" => {
                if self
                    .scheduler
                    .parameter
                    .as_ref()
                    .and_then(|parameters| parameters.get("exec"))
                    .and_then(|value| value.as_str())
                    .filter(|value| {
                        check_executable(&PathBuf::from(value)).unwrap_or_default()
                    })
                    .is_none()
                {
                    error!("scheduler.parameter.exec must be a valid path to an executable file");
                    contains_error = true;
                }

                if let Some(timeout) = self
                    .scheduler
                    .parameter
                    .as_ref()
                    .and_then(|parameters| parameters.get("timeout"))
                {
                    // 0 would time every stop request out before it starts
                    if timeout.as_u64().filter(|value| *value > 0).is_none() {
                        error!(
                            "scheduler.parameter.timeout must be a natural number greater than zero"
                        );
                        contains_error = true;
                    }
                }
            }
            "null" => {
                warn!("The null scheduler only logs stop requests, no resources will be freed");
            }
            scheduler_name => {
                error!("scheduler.name ({scheduler_name}) is not supported, please use `exec` or `null`");
                contains_error = true;
            }
        }

        self.cleanup.resolved.clear();
        for status in self.cleanup.statuses.iter() {
            match ExperimentStatus::from_str(status) {
                Ok(parsed) if parsed.is_done() => self.cleanup.resolved.push(parsed),
                Ok(parsed) => {
                    error!("cleanup.statuses member {parsed} is not a terminal status");
                    contains_error = true;
                }
                Err(e) => {
                    error!("cleanup.statuses contains an unknown status: {e}");
                    contains_error = true;
                }
            }
        }

        contains_error
    }
}

fn default_database_adapter() -> String {
    String::from("sqlite")
}

fn default_database_path() -> PathBuf {
    PathBuf::from_str("experiments.db").unwrap()
}
