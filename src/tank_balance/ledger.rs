use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use time::OffsetDateTime;

use crate::Error;

use super::core::{
    TankBalance, TankKey, apply_tank_delta, get_station_tank_balances, get_tank_balance,
    insert_tank_balance,
};

/// Owns the running balance of every tank.
///
/// Each operation holds the database lock for the duration of one statement,
/// and balance changes are applied with an atomic increment, so concurrent
/// callers never lose each other's updates.
#[derive(Debug, Clone)]
pub struct TankBalanceLedger {
    db_connection: Arc<Mutex<Connection>>,
}

impl TankBalanceLedger {
    /// Create a ledger backed by `db_connection`.
    pub fn new(db_connection: Arc<Mutex<Connection>>) -> Self {
        Self { db_connection }
    }

    /// Register a new tank with `opening_balance` litres.
    ///
    /// # Errors
    /// Returns [Error::InvalidRequest] if the tank is already registered.
    pub fn open_tank(&self, key: &TankKey, opening_balance: f64) -> Result<TankBalance, Error> {
        let connection = self.lock()?;
        let balance =
            insert_tank_balance(key, opening_balance, OffsetDateTime::now_utc(), &connection)?;
        tracing::info!(
            "Opened tank {} ({}) at station {} with {} L",
            key.tank_no,
            key.fuel_type,
            key.station_id,
            opening_balance
        );

        Ok(balance)
    }

    /// Get the current balance of a tank.
    ///
    /// # Errors
    /// Returns [Error::UnknownTank] if the tank is not registered.
    pub fn get_balance(&self, key: &TankKey) -> Result<TankBalance, Error> {
        let connection = self.lock()?;
        get_tank_balance(key, &connection)
    }

    /// Add `delta` litres (which may be negative) to a tank and return the updated balance.
    ///
    /// # Errors
    /// Returns [Error::UnknownTank] if the tank is not registered.
    pub fn apply_delta(&self, key: &TankKey, delta: f64) -> Result<TankBalance, Error> {
        let connection = self.lock()?;
        apply_tank_delta(key, delta, OffsetDateTime::now_utc(), &connection)
    }

    /// List the balances of every tank at `station_id`.
    pub fn list_balances(&self, station_id: &str) -> Result<Vec<TankBalance>, Error> {
        let connection = self.lock()?;
        get_station_tank_balances(station_id, &connection)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, Error> {
        self.db_connection.lock().map_err(|error| {
            tracing::error!("Could not acquire database lock: {error}");
            Error::DatabaseLockError
        })
    }
}
