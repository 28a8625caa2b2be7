//! Defines the fuel-in data model and its basic database queries.

use rusqlite::{
    Connection, Row, ToSql, named_params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    database_id::{FuelInId, SequenceCode},
    tank_balance::TankKey,
};

// ============================================================================
// MODELS
// ============================================================================

/// Whether a fuel-in record has been acknowledged by the cloud ledger.
///
/// The only transition is `Pending` to `Synced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// The cloud ledger has not accepted the record yet.
    Pending,
    /// The cloud ledger accepted the record.
    Synced,
}

impl SyncState {
    fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
        }
    }
}

impl ToSql for SyncState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SyncState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "pending" => Ok(SyncState::Pending),
            "synced" => Ok(SyncState::Synced),
            other => Err(FromSqlError::Other(
                format!("invalid sync state \"{other}\"").into(),
            )),
        }
    }
}

/// How a delivery was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    /// The received quantity was entered by hand.
    Manual,
    /// The tank gauge took an opening reading and the delivery is in progress.
    AtgOpened,
    /// The tank gauge took opening and closing readings.
    AtgClosed,
}

impl DeliveryKind {
    fn as_str(&self) -> &'static str {
        match self {
            DeliveryKind::Manual => "manual",
            DeliveryKind::AtgOpened => "atg_opened",
            DeliveryKind::AtgClosed => "atg_closed",
        }
    }
}

impl ToSql for DeliveryKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for DeliveryKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "manual" => Ok(DeliveryKind::Manual),
            "atg_opened" => Ok(DeliveryKind::AtgOpened),
            "atg_closed" => Ok(DeliveryKind::AtgClosed),
            other => Err(FromSqlError::Other(
                format!("invalid delivery kind \"{other}\"").into(),
            )),
        }
    }
}

/// A delivery of fuel into one of a station's storage tanks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelInRecord {
    /// The ID of the record.
    pub id: FuelInId,
    /// The station that received the fuel.
    pub station_id: String,
    /// The fuel type code of the delivered fuel.
    pub fuel_type: String,
    /// The tank the fuel was delivered into.
    pub tank_no: i64,
    /// The order in which the record was created, unique across the store.
    pub sequence_code: SequenceCode,
    /// The litres in the tank before the delivery, as read by the tank gauge.
    ///
    /// `None` for manually entered deliveries.
    pub opening_volume: Option<f64>,
    /// For manual deliveries, the tank balance just before this delivery was
    /// applied. For gauge deliveries, the closing volume (0 until closed).
    pub tank_balance_after: f64,
    /// The litres delivered.
    pub received_quantity: f64,
    /// The day the fuel was received.
    pub receive_date: Date,
    /// The driver of the delivery vehicle.
    pub driver: String,
    /// The delivery vehicle.
    pub bowser: String,
    /// How the delivery was measured.
    pub kind: DeliveryKind,
    /// Whether the cloud ledger has accepted the record.
    pub sync_state: SyncState,
    /// When the record was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The details of a manually recorded delivery.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FuelInRequest {
    /// The station receiving the fuel.
    pub station_id: String,
    /// The fuel type code of the delivered fuel, e.g. "004-Diesel".
    pub fuel_type: String,
    /// The tank the fuel is delivered into.
    pub tank_no: i64,
    /// The day the fuel was received.
    pub receive_date: Date,
    /// The litres delivered.
    pub received_quantity: f64,
    /// The driver of the delivery vehicle.
    pub driver: String,
    /// The delivery vehicle.
    pub bowser: String,
}

impl FuelInRequest {
    /// The tank this delivery goes into.
    pub fn tank_key(&self) -> TankKey {
        TankKey::new(&self.station_id, &self.fuel_type, self.tank_no)
    }

    /// Check that the required fields have been filled in.
    ///
    /// # Errors
    /// Returns [Error::InvalidRequest] naming the first invalid field.
    pub fn validate(&self) -> Result<(), Error> {
        for (name, value) in [
            ("station_id", &self.station_id),
            ("fuel_type", &self.fuel_type),
            ("driver", &self.driver),
            ("bowser", &self.bowser),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidRequest(format!("{name} must not be empty")));
            }
        }

        if !self.received_quantity.is_finite() || self.received_quantity < 0.0 {
            return Err(Error::InvalidRequest(format!(
                "received_quantity must be a non-negative number, got {}",
                self.received_quantity
            )));
        }

        Ok(())
    }
}

/// The column values for a new fuel-in row.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NewFuelIn<'a> {
    pub station_id: &'a str,
    pub fuel_type: &'a str,
    pub tank_no: i64,
    pub sequence_code: SequenceCode,
    pub opening_volume: Option<f64>,
    pub tank_balance_after: f64,
    pub received_quantity: f64,
    pub receive_date: Date,
    pub driver: &'a str,
    pub bowser: &'a str,
    pub kind: DeliveryKind,
    pub created_at: OffsetDateTime,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// The columns of the fuel-in table in the order expected by [map_fuel_in_row].
pub(crate) const FUEL_IN_COLUMNS: &str = "id, station_id, fuel_type, tank_no, sequence_code, \
    opening_volume, tank_balance_after, received_quantity, receive_date, driver, bowser, kind, \
    sync_state, created_at";

const FUEL_IN_SEQUENCE: &str = "fuel_in";

/// Create the fuel-in table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_fuel_in_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS fuel_in (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            station_id TEXT NOT NULL,
            fuel_type TEXT NOT NULL,
            tank_no INTEGER NOT NULL,
            sequence_code INTEGER NOT NULL UNIQUE,
            opening_volume REAL,
            tank_balance_after REAL NOT NULL,
            received_quantity REAL NOT NULL,
            receive_date TEXT NOT NULL,
            driver TEXT NOT NULL,
            bowser TEXT NOT NULL,
            kind TEXT NOT NULL,
            sync_state TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL
        )",
        (),
    )?;

    // Listing is always most recent first.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_fuel_in_created_at ON fuel_in(created_at, id);",
        (),
    )?;

    Ok(())
}

/// Create the table that hands out sequence codes.
///
/// The counter starts from the highest sequence code already in the fuel-in
/// table, so [create_fuel_in_table] must be called first.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_sequence_counter_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS sequence_counter (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        )",
        (),
    )?;

    connection.execute(
        "INSERT OR IGNORE INTO sequence_counter (name, value)
         SELECT ?1, COALESCE(MAX(sequence_code), 0) FROM fuel_in",
        (FUEL_IN_SEQUENCE,),
    )?;

    Ok(())
}

/// Take the next fuel-in sequence code.
///
/// The counter is incremented and read in one statement, so two callers can
/// never be handed the same code.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub(crate) fn next_sequence_code(connection: &Connection) -> Result<SequenceCode, Error> {
    connection
        .query_row(
            "UPDATE sequence_counter SET value = value + 1 WHERE name = ?1 RETURNING value",
            (FUEL_IN_SEQUENCE,),
            |row| row.get(0),
        )
        .map_err(Error::from)
}

/// Insert a new fuel-in row. New rows are always [SyncState::Pending].
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error, including a duplicate sequence code.
pub(crate) fn insert_fuel_in(
    new_fuel_in: &NewFuelIn,
    connection: &Connection,
) -> Result<FuelInRecord, Error> {
    let query = format!(
        "INSERT INTO fuel_in (station_id, fuel_type, tank_no, sequence_code, opening_volume, \
            tank_balance_after, received_quantity, receive_date, driver, bowser, kind, sync_state, \
            created_at)
         VALUES (:station_id, :fuel_type, :tank_no, :sequence_code, :opening_volume, \
            :tank_balance_after, :received_quantity, :receive_date, :driver, :bowser, :kind, \
            :sync_state, :created_at)
         RETURNING {FUEL_IN_COLUMNS}"
    );

    connection
        .prepare(&query)?
        .query_row(
            named_params! {
                ":station_id": new_fuel_in.station_id,
                ":fuel_type": new_fuel_in.fuel_type,
                ":tank_no": new_fuel_in.tank_no,
                ":sequence_code": new_fuel_in.sequence_code,
                ":opening_volume": new_fuel_in.opening_volume,
                ":tank_balance_after": new_fuel_in.tank_balance_after,
                ":received_quantity": new_fuel_in.received_quantity,
                ":receive_date": new_fuel_in.receive_date,
                ":driver": new_fuel_in.driver,
                ":bowser": new_fuel_in.bowser,
                ":kind": new_fuel_in.kind,
                ":sync_state": SyncState::Pending,
                ":created_at": new_fuel_in.created_at,
            },
            map_fuel_in_row,
        )
        .map_err(Error::from)
}

/// Retrieve a fuel-in record by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a fuel-in record,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_fuel_in(id: FuelInId, connection: &Connection) -> Result<FuelInRecord, Error> {
    let query = format!("SELECT {FUEL_IN_COLUMNS} FROM fuel_in WHERE id = :id");

    connection
        .prepare(&query)?
        .query_row(&[(":id", &id)], map_fuel_in_row)
        .map_err(Error::from)
}

/// Mark a pending record as accepted by the cloud ledger.
///
/// Records that are already synced are left untouched.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub(crate) fn mark_fuel_in_synced(id: FuelInId, connection: &Connection) -> Result<bool, Error> {
    let rows_affected = connection.execute(
        "UPDATE fuel_in SET sync_state = :synced WHERE id = :id AND sync_state = :pending",
        named_params! {
            ":synced": SyncState::Synced,
            ":id": id,
            ":pending": SyncState::Pending,
        },
    )?;

    Ok(rows_affected == 1)
}

/// Map a database row to a [FuelInRecord].
pub fn map_fuel_in_row(row: &Row) -> Result<FuelInRecord, rusqlite::Error> {
    Ok(FuelInRecord {
        id: row.get(0)?,
        station_id: row.get(1)?,
        fuel_type: row.get(2)?,
        tank_no: row.get(3)?,
        sequence_code: row.get(4)?,
        opening_volume: row.get(5)?,
        tank_balance_after: row.get(6)?,
        received_quantity: row.get(7)?,
        receive_date: row.get(8)?,
        driver: row.get(9)?,
        bowser: row.get(10)?,
        kind: row.get(11)?,
        sync_state: row.get(12)?,
        created_at: row.get(13)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;
    use time::macros::{date, datetime};

    use crate::{Error, db::initialize};

    use super::{
        DeliveryKind, FuelInRequest, NewFuelIn, SyncState, create_sequence_counter_table,
        get_fuel_in, insert_fuel_in, mark_fuel_in_synced, next_sequence_code,
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn new_fuel_in(sequence_code: i64) -> NewFuelIn<'static> {
        NewFuelIn {
            station_id: "station-1",
            fuel_type: "004-Diesel",
            tank_no: 1,
            sequence_code,
            opening_volume: None,
            tank_balance_after: 500.0,
            received_quantity: 200.0,
            receive_date: date!(2025 - 06 - 01),
            driver: "Aung",
            bowser: "YGN-1234",
            kind: DeliveryKind::Manual,
            created_at: datetime!(2025-06-01 08:00 UTC),
        }
    }

    #[test]
    fn sequence_codes_start_at_one_and_increase() {
        let conn = get_test_connection();

        let codes: Vec<i64> = (0..5).map(|_| next_sequence_code(&conn).unwrap()).collect();

        assert_eq!(codes, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn sequence_counter_resumes_after_existing_records() {
        let conn = Connection::open_in_memory().unwrap();
        super::create_fuel_in_table(&conn).unwrap();
        insert_fuel_in(&new_fuel_in(41), &conn).unwrap();
        create_sequence_counter_table(&conn).unwrap();

        assert_eq!(next_sequence_code(&conn), Ok(42));
    }

    #[test]
    fn insert_then_get_record() {
        let conn = get_test_connection();

        let inserted = insert_fuel_in(&new_fuel_in(1), &conn).unwrap();
        let got = get_fuel_in(inserted.id, &conn).unwrap();

        assert_eq!(inserted, got);
        assert_eq!(got.sync_state, SyncState::Pending);
        assert_eq!(got.kind, DeliveryKind::Manual);
        assert_eq!(got.receive_date, date!(2025 - 06 - 01));
        assert_eq!(got.opening_volume, None);
    }

    #[test]
    fn insert_fails_on_duplicate_sequence_code() {
        let conn = get_test_connection();
        insert_fuel_in(&new_fuel_in(1), &conn).unwrap();

        let result = insert_fuel_in(&new_fuel_in(1), &conn);

        assert!(
            matches!(result, Err(Error::SqlError(_))),
            "want SQL error, got {result:?}"
        );
    }

    #[test]
    fn get_missing_record_fails() {
        let conn = get_test_connection();

        assert_eq!(get_fuel_in(1337, &conn), Err(Error::NotFound));
    }

    #[test]
    fn mark_synced_only_moves_forward() {
        let conn = get_test_connection();
        let record = insert_fuel_in(&new_fuel_in(1), &conn).unwrap();

        assert_eq!(mark_fuel_in_synced(record.id, &conn), Ok(true));
        assert_eq!(mark_fuel_in_synced(record.id, &conn), Ok(false));
        assert_eq!(
            get_fuel_in(record.id, &conn).unwrap().sync_state,
            SyncState::Synced
        );
    }

    #[test]
    fn validate_rejects_blank_driver() {
        let request = FuelInRequest {
            station_id: "station-1".to_owned(),
            fuel_type: "004-Diesel".to_owned(),
            tank_no: 1,
            receive_date: date!(2025 - 06 - 01),
            received_quantity: 200.0,
            driver: "  ".to_owned(),
            bowser: "YGN-1234".to_owned(),
        };

        assert_eq!(
            request.validate(),
            Err(Error::InvalidRequest("driver must not be empty".to_owned()))
        );
    }

    #[test]
    fn validate_rejects_negative_quantity() {
        let request = FuelInRequest {
            station_id: "station-1".to_owned(),
            fuel_type: "004-Diesel".to_owned(),
            tank_no: 1,
            receive_date: date!(2025 - 06 - 01),
            received_quantity: -5.0,
            driver: "Aung".to_owned(),
            bowser: "YGN-1234".to_owned(),
        };

        assert!(
            matches!(request.validate(), Err(Error::InvalidRequest(_))),
            "want invalid request error"
        );
    }
}
