//! Measures deliveries with the automatic tank gauge (ATG).
//!
//! A gauge delivery is opened before the fuel is pumped, which records the
//! tank's opening volume, and closed afterwards, which records the closing
//! volume and the difference as the received quantity.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use rusqlite::{Connection, Transaction, TransactionBehavior, named_params};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::{
    Error,
    cloud_sync::{CloudEndpoint, CloudSyncPublisher, SyncOutcome},
    database_id::FuelInId,
    fuel_in::{
        DeliveryKind, FuelInRecord, NewFuelIn, SyncState, get_fuel_in, insert_fuel_in,
        next_sequence_code,
    },
    gauge::{TankGauge, TankReading},
};

/// The details needed to open a gauge delivery.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AtgOpenRequest {
    /// The station receiving the fuel.
    pub station_detail_id: String,
    /// The driver of the delivery vehicle.
    pub driver: String,
    /// The delivery vehicle.
    pub bowser: String,
    /// The tank the fuel is delivered into.
    pub tank_no: i64,
}

impl AtgOpenRequest {
    fn validate(&self) -> Result<(), Error> {
        for (name, value) in [
            ("station_detail_id", &self.station_detail_id),
            ("driver", &self.driver),
            ("bowser", &self.bowser),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidRequest(format!("{name} must not be empty")));
            }
        }

        Ok(())
    }
}

/// Opens and closes deliveries measured by the tank gauge.
///
/// Gauge readings are taken without holding the database lock.
#[derive(Clone)]
pub struct AtgReconciler {
    db_connection: Arc<Mutex<Connection>>,
    gauge: Arc<dyn TankGauge>,
    publisher: CloudSyncPublisher,
}

impl fmt::Debug for AtgReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtgReconciler")
            .field("db_connection", &self.db_connection)
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl AtgReconciler {
    /// Create a reconciler that reads tanks from `gauge`.
    pub fn new(
        db_connection: Arc<Mutex<Connection>>,
        gauge: Arc<dyn TankGauge>,
        publisher: CloudSyncPublisher,
    ) -> Self {
        Self {
            db_connection,
            gauge,
            publisher,
        }
    }

    /// Read the tank's opening volume and record the start of a delivery.
    ///
    /// The new record has a received quantity of zero until it is closed,
    /// and is not pushed to the cloud.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::InvalidRequest] if `request` is missing a required field,
    /// - [Error::Unavailable] if the gauge cannot be read, in which case nothing is stored,
    /// - [Error::UnmappedOilType] if the gauge reports an unknown oil type,
    /// - or [Error::SqlError] if there is an SQL error.
    pub async fn open(&self, request: AtgOpenRequest) -> Result<FuelInRecord, Error> {
        request.validate()?;

        let reading = self.gauge.read_tank(request.tank_no).await?;

        let now = OffsetDateTime::now_utc();
        let record = {
            let connection = self.lock()?;
            open_atg_fuel_in(&request, &reading, now, &connection)?
        };

        tracing::info!(
            "Opened gauge delivery {} into tank {} at station {} with {} L of {}",
            record.sequence_code,
            record.tank_no,
            record.station_id,
            reading.volume,
            reading.fuel_type
        );

        Ok(record)
    }

    /// Read the tank's closing volume, complete the delivery `id` and push it to the cloud.
    ///
    /// The received quantity is the closing volume less the opening volume.
    /// A negative quantity is stored as is and logged.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::NotFound] if there is no record with `id`,
    /// - [Error::DeliveryNotOpen] if the record is not an open gauge delivery,
    /// - [Error::Unavailable] if the gauge cannot be read, in which case the delivery stays open,
    /// - [Error::UnmappedOilType] if the gauge reports an unknown oil type,
    /// - or [Error::SqlError] if there is an SQL error.
    pub async fn close(&self, id: FuelInId) -> Result<FuelInRecord, Error> {
        let opened = {
            let connection = self.lock()?;
            get_fuel_in(id, &connection)?
        };
        if opened.kind != DeliveryKind::AtgOpened {
            return Err(Error::DeliveryNotOpen(id));
        }

        let reading = self.gauge.read_tank(opened.tank_no).await?;

        let mut record = {
            let connection = self.lock()?;
            close_atg_fuel_in(id, reading.volume, &connection)?
        };

        if record.received_quantity < 0.0 {
            tracing::warn!(
                "Gauge delivery {} into tank {} closed with a negative quantity of {} L",
                record.sequence_code,
                record.tank_no,
                record.received_quantity
            );
        } else {
            tracing::info!(
                "Closed gauge delivery {} into tank {} with {} L received",
                record.sequence_code,
                record.tank_no,
                record.received_quantity
            );
        }

        if self.publisher.publish(&record, CloudEndpoint::AtgFuelIn).await
            == SyncOutcome::Delivered
        {
            record.sync_state = SyncState::Synced;
        }

        Ok(record)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.db_connection.lock().map_err(|error| {
            tracing::error!("Could not acquire database lock: {error}");
            Error::DatabaseLockError
        })
    }
}

fn open_atg_fuel_in(
    request: &AtgOpenRequest,
    reading: &TankReading,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<FuelInRecord, Error> {
    let transaction = Transaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    let sequence_code = next_sequence_code(&transaction)?;
    let record = insert_fuel_in(
        &NewFuelIn {
            station_id: &request.station_detail_id,
            fuel_type: &reading.fuel_type,
            tank_no: request.tank_no,
            sequence_code,
            opening_volume: Some(reading.volume),
            tank_balance_after: 0.0,
            received_quantity: 0.0,
            receive_date: now.date(),
            driver: &request.driver,
            bowser: &request.bowser,
            kind: DeliveryKind::AtgOpened,
            created_at: now,
        },
        &transaction,
    )?;

    transaction.commit()?;

    Ok(record)
}

/// Close the open gauge delivery `id` at `closing_volume` litres.
///
/// The kind is checked again under the write lock, so a delivery can only be
/// closed once even if two closes race.
fn close_atg_fuel_in(
    id: FuelInId,
    closing_volume: f64,
    connection: &Connection,
) -> Result<FuelInRecord, Error> {
    let transaction = Transaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    let opened = get_fuel_in(id, &transaction)?;
    if opened.kind != DeliveryKind::AtgOpened {
        return Err(Error::DeliveryNotOpen(id));
    }

    let received_quantity = closing_volume - opened.opening_volume.unwrap_or_default();

    transaction.execute(
        "UPDATE fuel_in
         SET tank_balance_after = :closing_volume,
             received_quantity = :received_quantity,
             kind = :closed
         WHERE id = :id",
        named_params! {
            ":closing_volume": closing_volume,
            ":received_quantity": received_quantity,
            ":closed": DeliveryKind::AtgClosed,
            ":id": id,
        },
    )?;

    let closed = get_fuel_in(id, &transaction)?;
    transaction.commit()?;

    Ok(closed)
}
