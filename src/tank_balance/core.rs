//! Defines the tank balance model and the database queries that read and update it.

use rusqlite::{Connection, Row, named_params};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, database_id::DatabaseId};

// ============================================================================
// MODELS
// ============================================================================

/// Identifies a physical storage tank at a station.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TankKey {
    /// The station that owns the tank.
    pub station_id: String,
    /// The fuel type code stored in the tank, e.g. "004-Diesel".
    pub fuel_type: String,
    /// The tank number within the station.
    pub tank_no: i64,
}

impl TankKey {
    /// Create a key for tank `tank_no` holding `fuel_type` at `station_id`.
    pub fn new(station_id: &str, fuel_type: &str, tank_no: i64) -> Self {
        Self {
            station_id: station_id.to_owned(),
            fuel_type: fuel_type.to_owned(),
            tank_no,
        }
    }

    fn unknown_tank_error(&self) -> Error {
        Error::UnknownTank {
            station_id: self.station_id.clone(),
            fuel_type: self.fuel_type.clone(),
            tank_no: self.tank_no,
        }
    }
}

/// The current amount of fuel held in a tank, in litres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankBalance {
    /// The ID of the tank balance row.
    pub id: DatabaseId,
    /// The tank this balance belongs to.
    #[serde(flatten)]
    pub key: TankKey,
    /// The litres currently in the tank.
    pub balance: f64,
    /// The litres added (or removed if negative) by the most recent change.
    pub last_fuel_in: f64,
    /// When the balance last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the tank balance table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_tank_balance_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS tank_balance (
            id INTEGER PRIMARY KEY,
            station_id TEXT NOT NULL,
            fuel_type TEXT NOT NULL,
            tank_no INTEGER NOT NULL,
            balance REAL NOT NULL,
            last_fuel_in REAL NOT NULL DEFAULT 0,
            last_updated TEXT NOT NULL,
            UNIQUE(station_id, fuel_type, tank_no)
        )",
        (),
    )?;

    Ok(())
}

/// Map a database row to a [TankBalance].
pub fn map_row_to_tank_balance(row: &Row) -> Result<TankBalance, rusqlite::Error> {
    let id = row.get(0)?;
    let station_id = row.get(1)?;
    let fuel_type = row.get(2)?;
    let tank_no = row.get(3)?;
    let balance = row.get(4)?;
    let last_fuel_in = row.get(5)?;
    let last_updated = row.get(6)?;

    Ok(TankBalance {
        id,
        key: TankKey {
            station_id,
            fuel_type,
            tank_no,
        },
        balance,
        last_fuel_in,
        last_updated,
    })
}

/// Register a tank with its starting `balance`.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidRequest] if the tank has already been opened,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn insert_tank_balance(
    key: &TankKey,
    balance: f64,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<TankBalance, Error> {
    connection
        .prepare(
            "INSERT INTO tank_balance (station_id, fuel_type, tank_no, balance, last_fuel_in, last_updated)
             VALUES (:station_id, :fuel_type, :tank_no, :balance, 0, :now)
             RETURNING id, station_id, fuel_type, tank_no, balance, last_fuel_in, last_updated",
        )?
        .query_row(
            named_params! {
                ":station_id": key.station_id,
                ":fuel_type": key.fuel_type,
                ":tank_no": key.tank_no,
                ":balance": balance,
                ":now": now,
            },
            map_row_to_tank_balance,
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                _,
            ) => Error::InvalidRequest(format!(
                "tank {} for {} at station {} is already open",
                key.tank_no, key.fuel_type, key.station_id
            )),
            error => error.into(),
        })
}

/// Get the balance of the tank identified by `key`.
///
/// # Errors
/// This function will return a:
/// - [Error::UnknownTank] if the tank has not been opened,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_tank_balance(key: &TankKey, connection: &Connection) -> Result<TankBalance, Error> {
    connection
        .prepare(
            "SELECT id, station_id, fuel_type, tank_no, balance, last_fuel_in, last_updated
             FROM tank_balance
             WHERE station_id = :station_id AND fuel_type = :fuel_type AND tank_no = :tank_no",
        )?
        .query_row(
            named_params! {
                ":station_id": key.station_id,
                ":fuel_type": key.fuel_type,
                ":tank_no": key.tank_no,
            },
            map_row_to_tank_balance,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => key.unknown_tank_error(),
            error => error.into(),
        })
}

/// Add `delta` litres to the balance of the tank identified by `key`.
///
/// The balance is incremented by a single `UPDATE` statement so concurrent
/// changes to the same tank cannot overwrite each other.
///
/// # Errors
/// This function will return a:
/// - [Error::UnknownTank] if the tank has not been opened,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn apply_tank_delta(
    key: &TankKey,
    delta: f64,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<TankBalance, Error> {
    connection
        .prepare(
            "UPDATE tank_balance
             SET balance = balance + :delta, last_fuel_in = :delta, last_updated = :now
             WHERE station_id = :station_id AND fuel_type = :fuel_type AND tank_no = :tank_no
             RETURNING id, station_id, fuel_type, tank_no, balance, last_fuel_in, last_updated",
        )?
        .query_row(
            named_params! {
                ":delta": delta,
                ":now": now,
                ":station_id": key.station_id,
                ":fuel_type": key.fuel_type,
                ":tank_no": key.tank_no,
            },
            map_row_to_tank_balance,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => key.unknown_tank_error(),
            error => error.into(),
        })
}

/// Get the balances of every tank at `station_id`, ordered by tank number.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn get_station_tank_balances(
    station_id: &str,
    connection: &Connection,
) -> Result<Vec<TankBalance>, Error> {
    connection
        .prepare(
            "SELECT id, station_id, fuel_type, tank_no, balance, last_fuel_in, last_updated
             FROM tank_balance
             WHERE station_id = :station_id
             ORDER BY tank_no ASC, fuel_type ASC",
        )?
        .query_map(
            named_params! { ":station_id": station_id },
            map_row_to_tank_balance,
        )?
        .map(|result| result.map_err(Error::from))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;
    use time::macros::datetime;

    use crate::Error;

    use super::{
        TankKey, apply_tank_delta, create_tank_balance_table, get_station_tank_balances,
        get_tank_balance, insert_tank_balance,
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tank_balance_table(&conn).unwrap();
        conn
    }

    fn diesel_tank() -> TankKey {
        TankKey::new("station-1", "004-Diesel", 1)
    }

    #[test]
    fn insert_then_get_balance() {
        let conn = get_test_connection();
        let now = datetime!(2025-06-01 08:00 UTC);
        let inserted = insert_tank_balance(&diesel_tank(), 500.0, now, &conn).unwrap();

        let got = get_tank_balance(&diesel_tank(), &conn).unwrap();

        assert_eq!(inserted, got);
        assert_eq!(got.balance, 500.0);
        assert_eq!(got.last_fuel_in, 0.0);
        assert_eq!(got.last_updated, now);
    }

    #[test]
    fn insert_fails_on_duplicate_tank() {
        let conn = get_test_connection();
        let now = datetime!(2025-06-01 08:00 UTC);
        insert_tank_balance(&diesel_tank(), 500.0, now, &conn).unwrap();

        let result = insert_tank_balance(&diesel_tank(), 100.0, now, &conn);

        assert!(
            matches!(result, Err(Error::InvalidRequest(_))),
            "want invalid request error, got {result:?}"
        );
    }

    #[test]
    fn get_unknown_tank_fails() {
        let conn = get_test_connection();

        let result = get_tank_balance(&diesel_tank(), &conn);

        assert_eq!(
            result,
            Err(Error::UnknownTank {
                station_id: "station-1".to_owned(),
                fuel_type: "004-Diesel".to_owned(),
                tank_no: 1,
            })
        );
    }

    #[test]
    fn same_tank_number_with_other_fuel_type_is_a_different_tank() {
        let conn = get_test_connection();
        let now = datetime!(2025-06-01 08:00 UTC);
        insert_tank_balance(&diesel_tank(), 500.0, now, &conn).unwrap();

        let result = get_tank_balance(&TankKey::new("station-1", "001-Octane Ron(92)", 1), &conn);

        assert!(
            matches!(result, Err(Error::UnknownTank { .. })),
            "want unknown tank error, got {result:?}"
        );
    }

    #[test]
    fn apply_delta_adds_to_balance() {
        let conn = get_test_connection();
        let opened_at = datetime!(2025-06-01 08:00 UTC);
        let updated_at = datetime!(2025-06-01 09:30 UTC);
        insert_tank_balance(&diesel_tank(), 500.0, opened_at, &conn).unwrap();

        let got = apply_tank_delta(&diesel_tank(), 200.0, updated_at, &conn).unwrap();

        assert_eq!(got.balance, 700.0);
        assert_eq!(got.last_fuel_in, 200.0);
        assert_eq!(got.last_updated, updated_at);
        assert_eq!(got, get_tank_balance(&diesel_tank(), &conn).unwrap());
    }

    #[test]
    fn apply_negative_delta_subtracts_from_balance() {
        let conn = get_test_connection();
        let now = datetime!(2025-06-01 08:00 UTC);
        insert_tank_balance(&diesel_tank(), 500.0, now, &conn).unwrap();

        let got = apply_tank_delta(&diesel_tank(), -120.5, now, &conn).unwrap();

        assert_eq!(got.balance, 379.5);
        assert_eq!(got.last_fuel_in, -120.5);
    }

    #[test]
    fn apply_delta_to_unknown_tank_fails() {
        let conn = get_test_connection();

        let result = apply_tank_delta(&diesel_tank(), 10.0, datetime!(2025-06-01 08:00 UTC), &conn);

        assert!(
            matches!(result, Err(Error::UnknownTank { .. })),
            "want unknown tank error, got {result:?}"
        );
    }

    #[test]
    fn station_balances_are_ordered_by_tank_number() {
        let conn = get_test_connection();
        let now = datetime!(2025-06-01 08:00 UTC);
        insert_tank_balance(&TankKey::new("station-1", "004-Diesel", 3), 1.0, now, &conn).unwrap();
        insert_tank_balance(&TankKey::new("station-1", "002-Octane Ron(95)", 1), 2.0, now, &conn)
            .unwrap();
        insert_tank_balance(&TankKey::new("station-2", "004-Diesel", 2), 3.0, now, &conn).unwrap();

        let got = get_station_tank_balances("station-1", &conn).unwrap();

        let tank_numbers: Vec<i64> = got.iter().map(|balance| balance.key.tank_no).collect();
        assert_eq!(tank_numbers, vec![1, 3]);
    }
}
