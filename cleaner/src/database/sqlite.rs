use super::{
    util::placeholder_list, ConnectionError, Experiment, ExperimentStatus, SQL_SCHEMA,
    SQL_SCHEMA_NUMBER,
};
use crate::config::DatabaseConfig;
use parking_lot::{lock_api::ArcMutexGuard, FairMutex, RawFairMutex};
use rusqlite::{params, params_from_iter, Connection};
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_unwrap::ResultExt;

#[derive(Debug)]
/// Transparent, thread safe wrapper over `InnerConnection`
pub struct SharedConnection(Arc<FairMutex<InnerConnection>>);

#[derive(Debug)]
pub struct InnerConnection {
    connection: Connection,
}

impl SharedConnection {
    pub fn new(inner_connection: InnerConnection) -> Self {
        Self(Arc::new(FairMutex::new(inner_connection)))
    }

    fn lock_mut(&mut self) -> ArcMutexGuard<RawFairMutex, InnerConnection> {
        self.0.lock_arc()
    }

    fn lock(&self) -> ArcMutexGuard<RawFairMutex, InnerConnection> {
        self.0.lock_arc()
    }

    pub fn load(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        Ok(Self::new(InnerConnection::load(config)?))
    }

    pub fn init(&mut self) -> Result<(), ConnectionError> {
        self.lock_mut().init()
    }

    pub fn experiments_by_status(
        &self,
        statuses: &[ExperimentStatus],
    ) -> Result<Vec<Experiment>, ConnectionError> {
        self.lock().experiments_by_status(statuses)
    }

    pub fn insert_experiment(
        &self,
        name: &str,
        status: ExperimentStatus,
    ) -> Result<i64, ConnectionError> {
        self.lock().insert_experiment(name, status)
    }

    pub fn update_status(&self, id: i64, status: ExperimentStatus) -> Result<(), ConnectionError> {
        self.lock().update_status(id, status)
    }

    pub fn close(self) -> Result<(), ConnectionError> {
        Arc::try_unwrap(self.0).unwrap_or_log().into_inner().close()
    }
}

impl InnerConnection {
    pub fn load(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        debug!("Opening SQLite store at {}", config.path.to_string_lossy());

        Ok(Self {
            connection: Connection::open(&config.path)?,
        })
    }

    pub fn init(&mut self) -> Result<(), ConnectionError> {
        let mut counter = 1;

        for table in SQL_SCHEMA {
            match self.connection.execute(table, []) {
                Ok(_) => info!("Applied SQL schema ({counter}/{SQL_SCHEMA_NUMBER})"),
                Err(error) => {
                    error!(error = ?error, table = table, "Failed to apply SQL schema ({counter}/{SQL_SCHEMA_NUMBER}): {error}");

                    return Err(ConnectionError::SQLite(error));
                }
            };

            counter += 1;
        }

        Ok(())
    }

    pub fn experiments_by_status(
        &self,
        statuses: &[ExperimentStatus],
    ) -> Result<Vec<Experiment>, ConnectionError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        self.connection
            .prepare_cached(&format!(
                "select id, name, status from experiments where status in ({}) order by id",
                placeholder_list(statuses.len())
            ))?
            .query_map(
                params_from_iter(statuses.iter().map(|status| *status as i8)),
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?
            .try_fold(Vec::new(), |mut init, result| {
                let (id, name, status): (i64, String, i8) = result?;

                init.push(Experiment {
                    id,
                    name,
                    status: status.try_into()?,
                });

                Ok::<Vec<Experiment>, ConnectionError>(init)
            })
    }

    pub fn insert_experiment(
        &self,
        name: &str,
        status: ExperimentStatus,
    ) -> Result<i64, ConnectionError> {
        let id = self
            .connection
            .prepare_cached("insert into experiments (name, status) values (?, ?) returning id")?
            .query_row(params![name, status as i8], |row| row.get(0))?;

        info!(name = %name, id = %id, "Created experiment entry");

        Ok(id)
    }

    pub fn update_status(&self, id: i64, status: ExperimentStatus) -> Result<(), ConnectionError> {
        let updated = self
            .connection
            .prepare_cached("update experiments set status = ? where id = ?")?
            .execute(params![status as i8, id])?;

        if updated == 0 {
            error!(id = %id, "No experiment entry to update");

            return Err(ConnectionError::SQLite(
                rusqlite::Error::QueryReturnedNoRows,
            ));
        }

        Ok(())
    }

    pub fn close(self) -> Result<(), ConnectionError> {
        self.connection
            .close()
            .map_err(|(_, error)| ConnectionError::SQLite(error))
    }
}
