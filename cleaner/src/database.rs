pub mod sqlite;
pub mod util;

use crate::config::DatabaseConfig;
use serde::{Deserialize, Serialize};
use serde_repr::*;
use std::{fmt, str::FromStr};
use thiserror::Error;

// MID TERM: add a postgres adapter for shared deployments
// LONG TERM: add an exporter (CSV) for audits of swept experiments

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("SQLite query failed")]
    SQLite(#[from] rusqlite::Error),
    #[error("Unknown experiment status value {0}")]
    UnknownStatus(i8),
    #[error("Database adapter not supported")]
    UnsupportedAdapter(String),
}

/// Lifecycle states an experiment record moves through.
/// Stored as a tinyint column, hence the fixed discriminants.
#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Debug, Clone, Copy)]
#[repr(i8)]
pub enum ExperimentStatus {
    Created = 0,
    Building = 1,
    Scheduled = 2,
    Starting = 3,
    Running = 4,
    Succeeded = 5,
    Failed = 6,
    Stopped = 7,
}

/// Terminal states: experiments in these states no longer need their
/// compute resources and are eligible for cleanup.
pub const DONE_STATUS: [ExperimentStatus; 3] = [
    ExperimentStatus::Succeeded,
    ExperimentStatus::Failed,
    ExperimentStatus::Stopped,
];

impl ExperimentStatus {
    pub fn is_done(&self) -> bool {
        DONE_STATUS.contains(self)
    }
}

impl TryFrom<i8> for ExperimentStatus {
    type Error = ConnectionError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Created),
            1 => Ok(Self::Building),
            2 => Ok(Self::Scheduled),
            3 => Ok(Self::Starting),
            4 => Ok(Self::Running),
            5 => Ok(Self::Succeeded),
            6 => Ok(Self::Failed),
            7 => Ok(Self::Stopped),
            unknown => Err(ConnectionError::UnknownStatus(unknown)),
        }
    }
}

impl FromStr for ExperimentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "building" => Ok(Self::Building),
            "scheduled" => Ok(Self::Scheduled),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "stopped" => Ok(Self::Stopped),
            unknown => Err(format!("'{unknown}' is not an experiment status")),
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Building => "building",
            Self::Scheduled => "scheduled",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };

        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: i64,
    pub name: String,
    pub status: ExperimentStatus,
}

// ref: https://www.sqlite.org/lang_createtable.html
pub const SQL_SCHEMA: [&'static str; 2] = [
    "create table if not exists experiments (
    id integer primary key autoincrement,
    name text not null,
    status tinyint not null default(0)
);",
    "create index if not exists idx_experiments_status on experiments (status);",
];
pub const SQL_SCHEMA_NUMBER: usize = SQL_SCHEMA.len();

#[derive(Debug)]
/// All supported storage backends, selected by name from the config
/// (this is deliberately not made with dynamic dispatch to avoid the headache)
pub enum ConnectionAdapters {
    Sqlite(sqlite::SharedConnection),
}

impl ConnectionAdapters {
    pub fn load(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        match config.adapter.as_str() {
            "sqlite" => sqlite::SharedConnection::load(config).map(Self::Sqlite),
            other => Err(ConnectionError::UnsupportedAdapter(other.to_owned())),
        }
    }

    /// apply the idempotent schema so a fresh store is usable right away
    pub fn init(&mut self) -> Result<(), ConnectionError> {
        match self {
            Self::Sqlite(connection) => connection.init(),
        }
    }

    /// all experiments whose status is a member of `statuses`
    pub fn experiments_by_status(
        &self,
        statuses: &[ExperimentStatus],
    ) -> Result<Vec<Experiment>, ConnectionError> {
        match self {
            Self::Sqlite(connection) => connection.experiments_by_status(statuses),
        }
    }

    /// register a new experiment record, used by operators seeding a store.
    /// The cleanup task itself never goes through here.
    pub fn insert_experiment(
        &self,
        name: &str,
        status: ExperimentStatus,
    ) -> Result<i64, ConnectionError> {
        match self {
            Self::Sqlite(connection) => connection.insert_experiment(name, status),
        }
    }

    pub fn update_status(&self, id: i64, status: ExperimentStatus) -> Result<(), ConnectionError> {
        match self {
            Self::Sqlite(connection) => connection.update_status(id, status),
        }
    }

    pub fn close(self) -> Result<(), ConnectionError> {
        match self {
            Self::Sqlite(connection) => connection.close(),
        }
    }
}

#[cfg(test)]
mod status_test {
    use super::*;

    #[test]
    fn done_statuses_are_terminal() {
        assert!(ExperimentStatus::Succeeded.is_done());
        assert!(ExperimentStatus::Failed.is_done());
        assert!(ExperimentStatus::Stopped.is_done());

        assert!(!ExperimentStatus::Created.is_done());
        assert!(!ExperimentStatus::Building.is_done());
        assert!(!ExperimentStatus::Scheduled.is_done());
        assert!(!ExperimentStatus::Starting.is_done());
        assert!(!ExperimentStatus::Running.is_done());
    }

    #[test]
    fn status_roundtrips_through_column_value() {
        for status in [
            ExperimentStatus::Created,
            ExperimentStatus::Building,
            ExperimentStatus::Scheduled,
            ExperimentStatus::Starting,
            ExperimentStatus::Running,
            ExperimentStatus::Succeeded,
            ExperimentStatus::Failed,
            ExperimentStatus::Stopped,
        ] {
            assert_eq!(ExperimentStatus::try_from(status as i8).unwrap(), status);
        }
    }

    #[test]
    fn unknown_column_value_is_rejected() {
        assert!(matches!(
            ExperimentStatus::try_from(42),
            Err(ConnectionError::UnknownStatus(42))
        ));
    }

    #[test]
    fn status_parses_from_name() {
        assert_eq!(
            "succeeded".parse::<ExperimentStatus>().unwrap(),
            ExperimentStatus::Succeeded
        );
        assert_eq!(
            "Failed".parse::<ExperimentStatus>().unwrap(),
            ExperimentStatus::Failed
        );
        assert!("finished".parse::<ExperimentStatus>().is_err());
    }
}
