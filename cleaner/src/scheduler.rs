pub mod exec;

use crate::{
    config::{ConfigErrors, SchedulerConfig},
    database::Experiment,
};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Failed to spawn stop command")]
    SpawnFailed(std::io::Error),
    #[error("Failed to wait for a child proccess")]
    ChildError(#[from] std::io::Error),
    #[error("Stop command timeout")]
    ChildTimeout,
    #[error("Stop command exited with status {0}")]
    StopFailed(i32),
}

/// A collaborator able to stop the compute resources of one experiment.
///
/// Stopping an already stopped experiment must be a no-op on the scheduler
/// side, overlapping sweeps are not guarded against here.
pub trait Scheduler {
    fn stop(&self, experiment: &Experiment) -> Result<(), SchedulerError>;
}

#[derive(Debug, Clone)]
/// All possible scheduler variants, selected by name from the config
/// (this is deliberately not made with dynamic dispatch to avoid the headache)
pub enum Schedulers {
    Exec(exec::ExecScheduler),
    Null,
}

impl Schedulers {
    pub fn load(config: &SchedulerConfig) -> Result<Self, ConfigErrors> {
        match config.name.as_str() {
            "exec" => exec::ExecScheduler::load(config).map(Self::Exec),
            "null" => Ok(Self::Null),
            _ => Err(ConfigErrors::UnsupportedScheduler(config.name.clone())),
        }
    }
}

impl Scheduler for Schedulers {
    #[tracing::instrument(level = "debug")]
    fn stop(&self, experiment: &Experiment) -> Result<(), SchedulerError> {
        match self {
            Self::Exec(scheduler) => scheduler.stop(experiment),
            Self::Null => {
                info!(
                    id = %experiment.id,
                    name = %experiment.name,
                    "Null scheduler, dropping stop request"
                );

                Ok(())
            }
        }
    }
}
