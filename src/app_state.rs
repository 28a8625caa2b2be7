//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::{
    AppConfig, Error, atg::AtgReconciler, cloud_sync::CloudSyncPublisher, db::initialize,
    fuel_in::FuelInRecorder, gauge::TankGauge, tank_balance::TankBalanceLedger,
};

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The values the server was started with.
    pub config: AppConfig,

    /// The running balance of each tank.
    pub ledger: TankBalanceLedger,

    /// Records manually measured deliveries.
    pub recorder: FuelInRecorder,

    /// Records deliveries measured with the tank gauge.
    pub reconciler: AtgReconciler,

    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    /// Tank readings are taken from `gauge`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(
        db_connection: Connection,
        config: AppConfig,
        gauge: Arc<dyn TankGauge>,
    ) -> Result<Self, Error> {
        initialize(&db_connection)?;

        let connection = Arc::new(Mutex::new(db_connection));
        let publisher = CloudSyncPublisher::new(&config, connection.clone());

        Ok(Self {
            ledger: TankBalanceLedger::new(connection.clone()),
            recorder: FuelInRecorder::new(
                connection.clone(),
                publisher.clone(),
                config.pagination.clone(),
            ),
            reconciler: AtgReconciler::new(connection.clone(), gauge, publisher),
            config,
            db_connection: connection,
        })
    }
}
