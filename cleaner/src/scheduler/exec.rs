use super::{Scheduler, SchedulerError};
use crate::{
    config::{ConfigErrors, SchedulerConfig},
    database::Experiment,
};
use std::{
    ffi::OsString,
    io::Read,
    process::{Command, Stdio},
    time::Duration,
};
use tracing::{debug, error, warn};
use tracing_unwrap::ResultExt;
use wait_timeout::ChildExt;

#[derive(Debug, Clone)]
/// Scheduler adapter that delegates each stop request to an external
/// executable, e.g. a kubectl/scancel wrapper script. The experiment id and
/// name are appended as the last two arguments.
pub struct ExecScheduler {
    pub exec: OsString,
    pub params: OsString,
    pub timeout: Duration,
}

impl ExecScheduler {
    pub fn load(config: &SchedulerConfig) -> Result<Self, ConfigErrors> {
        let parameter = config.parameter.as_ref();

        if let Some(Some(exec)) = parameter
            .and_then(|parameters| parameters.get("exec"))
            .map(|exec| exec.as_str())
        {
            let timeout = Duration::from_millis(
                match parameter.and_then(|parameters| parameters.get("timeout")) {
                    Some(timeout_value) => match timeout_value.as_u64() {
                        Some(value) if value > 0 => value,
                        _ => {
                            warn!("Scheduler timeout must be a natural number greater than zero");
                            return Err(ConfigErrors::FailedLoadScheduler);
                        }
                    },
                    None => 2000,
                },
            );

            let params = match parameter.and_then(|parameters| parameters.get("params")) {
                Some(value) => match value.as_str() {
                    Some(value) => OsString::from(value),
                    None => {
                        warn!("Scheduler params must be a string");
                        return Err(ConfigErrors::FailedLoadScheduler);
                    }
                },
                None => OsString::new(),
            };

            Ok(Self {
                exec: OsString::from(exec),
                params,
                timeout,
            })
        } else {
            error!("The exec scheduler requires scheduler.parameter.exec to be a str pointing to the path of the stop executable");

            Err(ConfigErrors::FailedLoadScheduler)
        }
    }
}

impl Scheduler for ExecScheduler {
    #[tracing::instrument(level = "debug")]
    fn stop(&self, experiment: &Experiment) -> Result<(), SchedulerError> {
        let mut command = Command::new(&self.exec);

        if !self.params.is_empty() {
            command.arg(&self.params);
        }

        // stdout is never consumed; a pipe here would block verbose stop
        // commands once the pipe buffer fills up
        match command
            .arg(experiment.id.to_string())
            .arg(&experiment.name)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .spawn()
        {
            Ok(mut handle) => {
                debug!("Stop command waiting on {}", handle.id());

                let status = match handle.wait_timeout(self.timeout)? {
                    Some(status) => {
                        debug!("Stop command exit status: {status:?}");

                        status
                    }
                    None => {
                        debug!("Stop command ran into timeout, attempting to continue");
                        handle.kill().unwrap_or_log();
                        // reap the killed child, otherwise it lingers as a
                        // zombie for the rest of the sweep
                        handle.wait().unwrap_or_log();

                        return Err(SchedulerError::ChildTimeout);
                    }
                };

                if !status.success() {
                    let mut stderr_buffer = String::new();

                    if let Some(mut stderr) = handle.stderr.take() {
                        let _ = stderr.read_to_string(&mut stderr_buffer);
                    }

                    error!(
                        stderr = stderr_buffer,
                        id = %experiment.id,
                        "Stop command failed, attempting to continue"
                    );

                    return Err(SchedulerError::StopFailed(status.code().unwrap_or(-1)));
                }

                Ok(())
            }
            Err(e) => Err(SchedulerError::SpawnFailed(e)),
        }
    }
}
