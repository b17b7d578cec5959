use crate::{
    database::{ConnectionAdapters, ConnectionError, ExperimentStatus},
    scheduler::Scheduler,
};
use tracing::{error, info, instrument};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
/// counters of a single cleanup sweep
pub struct CleanupSummary {
    pub examined: usize,
    pub stopped: usize,
    pub failed: usize,
}

/// Sweep the store once: every experiment whose status is in `statuses` at
/// query time gets exactly one stop request.
///
/// A store error aborts the sweep, there is nothing to act on without the
/// query. A scheduler error only skips the affected experiment; the remaining
/// stop requests are still issued and the failure is counted in the summary.
/// Experiments that turn terminal after the query snapshot are picked up by
/// the next sweep.
#[instrument(skip(connection, scheduler), level = "info")]
pub fn run<S: Scheduler>(
    connection: &ConnectionAdapters,
    scheduler: &S,
    statuses: &[ExperimentStatus],
) -> Result<CleanupSummary, ConnectionError> {
    let experiments = connection.experiments_by_status(statuses)?;

    let mut summary = CleanupSummary {
        examined: experiments.len(),
        ..CleanupSummary::default()
    };

    for experiment in experiments {
        match scheduler.stop(&experiment) {
            Ok(()) => {
                info!(
                    id = %experiment.id,
                    name = %experiment.name,
                    status = %experiment.status,
                    "Stopped resources of experiment"
                );

                summary.stopped += 1;
            }
            Err(e) => {
                // log-and-continue: one broken experiment must not block the sweep
                error!(
                    error = ?e,
                    id = %experiment.id,
                    name = %experiment.name,
                    "Failed to stop resources of experiment: {e}"
                );

                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod cleanup_test {
    use super::*;
    use crate::{
        config::DatabaseConfig,
        database::{Experiment, DONE_STATUS},
        scheduler::SchedulerError,
    };
    use parking_lot::FairMutex;
    use std::{path::PathBuf, str::FromStr};

    /// test double recording every stop request, failing for selected ids
    #[derive(Debug, Default)]
    struct RecordingScheduler {
        stopped: FairMutex<Vec<i64>>,
        failing: Vec<i64>,
    }

    impl Scheduler for RecordingScheduler {
        fn stop(&self, experiment: &Experiment) -> Result<(), SchedulerError> {
            self.stopped.lock().push(experiment.id);

            if self.failing.contains(&experiment.id) {
                Err(SchedulerError::StopFailed(1))
            } else {
                Ok(())
            }
        }
    }

    fn memory_store(experiments: &[(&str, ExperimentStatus)]) -> ConnectionAdapters {
        let config = DatabaseConfig {
            adapter: String::from("sqlite"),
            path: PathBuf::from_str(":memory:").unwrap(),
        };

        let mut connection = ConnectionAdapters::load(&config).unwrap();
        connection.init().unwrap();

        for (name, status) in experiments {
            connection.insert_experiment(name, *status).unwrap();
        }

        connection
    }

    #[test]
    fn stops_terminal_experiments_exactly_once() {
        let connection = memory_store(&[
            ("a", ExperimentStatus::Succeeded),
            ("b", ExperimentStatus::Running),
            ("c", ExperimentStatus::Failed),
        ]);
        let scheduler = RecordingScheduler::default();

        let summary = run(&connection, &scheduler, &DONE_STATUS).unwrap();

        assert_eq!(
            summary,
            CleanupSummary {
                examined: 2,
                stopped: 2,
                failed: 0
            }
        );
        // a and c got one stop request each, b none
        assert_eq!(*scheduler.stopped.lock(), vec![1, 3]);
    }

    #[test]
    fn empty_store_issues_no_stop_requests() {
        let connection = memory_store(&[]);
        let scheduler = RecordingScheduler::default();

        let summary = run(&connection, &scheduler, &DONE_STATUS).unwrap();

        assert_eq!(summary, CleanupSummary::default());
        assert!(scheduler.stopped.lock().is_empty());
    }

    #[test]
    fn non_terminal_experiments_are_left_alone() {
        let connection = memory_store(&[
            ("a", ExperimentStatus::Created),
            ("b", ExperimentStatus::Building),
            ("c", ExperimentStatus::Scheduled),
            ("d", ExperimentStatus::Starting),
            ("e", ExperimentStatus::Running),
        ]);
        let scheduler = RecordingScheduler::default();

        let summary = run(&connection, &scheduler, &DONE_STATUS).unwrap();

        assert_eq!(summary.examined, 0);
        assert!(scheduler.stopped.lock().is_empty());
    }

    #[test]
    fn scheduler_failure_does_not_block_the_sweep() {
        let connection = memory_store(&[
            ("a", ExperimentStatus::Succeeded),
            ("b", ExperimentStatus::Failed),
            ("c", ExperimentStatus::Stopped),
        ]);
        let scheduler = RecordingScheduler {
            failing: vec![2],
            ..RecordingScheduler::default()
        };

        let summary = run(&connection, &scheduler, &DONE_STATUS).unwrap();

        assert_eq!(
            summary,
            CleanupSummary {
                examined: 3,
                stopped: 2,
                failed: 1
            }
        );
        // the failing experiment was attempted, the later ones still ran
        assert_eq!(*scheduler.stopped.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn status_subset_restricts_the_sweep() {
        let connection = memory_store(&[
            ("a", ExperimentStatus::Succeeded),
            ("b", ExperimentStatus::Failed),
            ("c", ExperimentStatus::Stopped),
        ]);
        let scheduler = RecordingScheduler::default();

        let summary = run(&connection, &scheduler, &[ExperimentStatus::Failed]).unwrap();

        assert_eq!(summary.stopped, 1);
        assert_eq!(*scheduler.stopped.lock(), vec![2]);
    }

    #[test]
    fn repeated_sweeps_are_snapshots() {
        let connection = memory_store(&[("a", ExperimentStatus::Running)]);
        let scheduler = RecordingScheduler::default();

        let summary = run(&connection, &scheduler, &DONE_STATUS).unwrap();
        assert_eq!(summary.examined, 0);

        // the experiment turns terminal after the first sweep
        connection
            .update_status(1, ExperimentStatus::Succeeded)
            .unwrap();

        let summary = run(&connection, &scheduler, &DONE_STATUS).unwrap();
        assert_eq!(summary.stopped, 1);
        assert_eq!(*scheduler.stopped.lock(), vec![1]);
    }
}
