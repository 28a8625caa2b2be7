//! Filters, patches and the bulk queries that use them.

use rusqlite::{Connection, ToSql, Transaction, TransactionBehavior, params_from_iter};
use serde::Deserialize;
use time::Date;

use crate::{Error, database_id::FuelInId};

use super::core::{DeliveryKind, FUEL_IN_COLUMNS, FuelInRecord, SyncState, map_fuel_in_row};

// ============================================================================
// MODELS
// ============================================================================

/// Selects fuel-in records by their fields.
///
/// Every field that is set must match. The default filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FuelInFilter {
    /// Only match records from this station.
    pub station_id: Option<String>,
    /// Only match records of this fuel type code.
    pub fuel_type: Option<String>,
    /// Only match records for this tank number.
    pub tank_no: Option<i64>,
    /// Only match records received on this day.
    pub receive_date: Option<Date>,
    /// Only match records in this sync state.
    pub sync_state: Option<SyncState>,
    /// Only match records of this kind.
    pub kind: Option<DeliveryKind>,
}

impl FuelInFilter {
    /// Match records from `station_id`.
    pub fn station_id(mut self, station_id: &str) -> Self {
        self.station_id = Some(station_id.to_owned());
        self
    }

    /// Match records of `fuel_type`.
    pub fn fuel_type(mut self, fuel_type: &str) -> Self {
        self.fuel_type = Some(fuel_type.to_owned());
        self
    }

    /// Match records for tank `tank_no`.
    pub fn tank_no(mut self, tank_no: i64) -> Self {
        self.tank_no = Some(tank_no);
        self
    }

    /// Match records received on `receive_date`.
    pub fn receive_date(mut self, receive_date: Date) -> Self {
        self.receive_date = Some(receive_date);
        self
    }

    /// Match records in `sync_state`.
    pub fn sync_state(mut self, sync_state: SyncState) -> Self {
        self.sync_state = Some(sync_state);
        self
    }

    /// Match records of `kind`.
    pub fn kind(mut self, kind: DeliveryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub(crate) fn conditions(&self) -> SqlConditions {
        let mut conditions = SqlConditions::default();

        if let Some(station_id) = &self.station_id {
            conditions.push("station_id = ?", vec![Box::new(station_id.clone())]);
        }

        if let Some(fuel_type) = &self.fuel_type {
            conditions.push("fuel_type = ?", vec![Box::new(fuel_type.clone())]);
        }

        if let Some(tank_no) = self.tank_no {
            conditions.push("tank_no = ?", vec![Box::new(tank_no)]);
        }

        if let Some(receive_date) = self.receive_date {
            conditions.push("receive_date = ?", vec![Box::new(receive_date)]);
        }

        if let Some(sync_state) = self.sync_state {
            conditions.push("sync_state = ?", vec![Box::new(sync_state)]);
        }

        if let Some(kind) = self.kind {
            conditions.push("kind = ?", vec![Box::new(kind)]);
        }

        conditions
    }
}

/// The fields of a fuel-in record that may be corrected after it was created.
///
/// The sequence code, sync state and kind of a record are managed by the
/// application and cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FuelInPatch {
    /// The driver of the delivery vehicle.
    pub driver: Option<String>,
    /// The delivery vehicle.
    pub bowser: Option<String>,
    /// The day the fuel was received.
    pub receive_date: Option<Date>,
    /// The litres delivered.
    pub received_quantity: Option<f64>,
    /// The tank balance recorded with the delivery.
    pub tank_balance_after: Option<f64>,
    /// The opening volume recorded with the delivery.
    pub opening_volume: Option<f64>,
}

impl FuelInPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check that the patched values are usable.
    ///
    /// # Errors
    /// Returns [Error::InvalidRequest] naming the first invalid field.
    pub fn validate(&self) -> Result<(), Error> {
        for (name, value) in [("driver", &self.driver), ("bowser", &self.bowser)] {
            if value.as_ref().is_some_and(|value| value.trim().is_empty()) {
                return Err(Error::InvalidRequest(format!("{name} must not be empty")));
            }
        }

        for (name, value) in [
            ("received_quantity", self.received_quantity),
            ("tank_balance_after", self.tank_balance_after),
            ("opening_volume", self.opening_volume),
        ] {
            if value.is_some_and(|value| !value.is_finite()) {
                return Err(Error::InvalidRequest(format!("{name} must be a number")));
            }
        }

        Ok(())
    }

    fn assignments(&self) -> SqlConditions {
        let mut assignments = SqlConditions::default();

        if let Some(driver) = &self.driver {
            assignments.push("driver = ?", vec![Box::new(driver.clone())]);
        }

        if let Some(bowser) = &self.bowser {
            assignments.push("bowser = ?", vec![Box::new(bowser.clone())]);
        }

        if let Some(receive_date) = self.receive_date {
            assignments.push("receive_date = ?", vec![Box::new(receive_date)]);
        }

        if let Some(received_quantity) = self.received_quantity {
            assignments.push("received_quantity = ?", vec![Box::new(received_quantity)]);
        }

        if let Some(tank_balance_after) = self.tank_balance_after {
            assignments.push("tank_balance_after = ?", vec![Box::new(tank_balance_after)]);
        }

        if let Some(opening_volume) = self.opening_volume {
            assignments.push("opening_volume = ?", vec![Box::new(opening_volume)]);
        }

        assignments
    }
}

/// SQL fragments with anonymous `?` placeholders and their parameters, in order.
#[derive(Default)]
pub(crate) struct SqlConditions {
    parts: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl SqlConditions {
    /// Add `part`, which must contain one `?` per entry in `params`.
    pub(crate) fn push(&mut self, part: impl Into<String>, params: Vec<Box<dyn ToSql>>) {
        self.parts.push(part.into());
        self.params.extend(params);
    }

    /// The conditions as a `WHERE` clause, or an empty string if there are none.
    pub(crate) fn where_clause(&self) -> String {
        if self.parts.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.parts.join(" AND "))
        }
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Get the records matching `conditions`, most recently created first.
///
/// `limit` of `None` returns every matching record after `offset`.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub(crate) fn select_fuel_ins(
    conditions: &SqlConditions,
    limit: Option<u64>,
    offset: u64,
    connection: &Connection,
) -> Result<Vec<FuelInRecord>, Error> {
    // SQLite treats a negative limit as no limit.
    let limit = limit.map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX));
    let offset = i64::try_from(offset).unwrap_or(i64::MAX);

    let query = format!(
        "SELECT {FUEL_IN_COLUMNS} FROM fuel_in {} \
         ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        conditions.where_clause()
    );

    let mut params: Vec<&dyn ToSql> = conditions.params.iter().map(|p| p.as_ref()).collect();
    params.push(&limit);
    params.push(&offset);

    connection
        .prepare(&query)?
        .query_map(params_from_iter(params), map_fuel_in_row)?
        .map(|record_result| record_result.map_err(Error::from))
        .collect()
}

/// Count the records matching `conditions`.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub(crate) fn count_fuel_ins(
    conditions: &SqlConditions,
    connection: &Connection,
) -> Result<u64, Error> {
    let query = format!("SELECT COUNT(*) FROM fuel_in {}", conditions.where_clause());

    connection
        .query_row(&query, params_from_iter(conditions.params.iter()), |row| {
            row.get::<_, i64>(0)
        })
        .map(|count| count as u64)
        .map_err(Error::from)
}

/// Apply `patch` to every record matching `filter` and return the updated records.
///
/// The matching and the update happen in one transaction.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingFuelIn] if no record matches `filter`,
/// - or [Error::SqlError] if there is some other SQL error.
pub(crate) fn update_fuel_ins(
    filter: &FuelInFilter,
    patch: &FuelInPatch,
    connection: &Connection,
) -> Result<Vec<FuelInRecord>, Error> {
    let transaction = Transaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    let ids = select_fuel_in_ids(&filter.conditions(), &transaction)?;
    if ids.is_empty() {
        return Err(Error::UpdateMissingFuelIn);
    }

    let mut by_id = SqlConditions::default();
    by_id.push(
        id_list_condition(ids.len()),
        ids.iter()
            .map(|id| Box::new(*id) as Box<dyn ToSql>)
            .collect(),
    );

    let assignments = patch.assignments();
    if !assignments.parts.is_empty() {
        let query = format!(
            "UPDATE fuel_in SET {} {}",
            assignments.parts.join(", "),
            by_id.where_clause()
        );
        let params = assignments.params.iter().chain(by_id.params.iter());
        transaction.execute(&query, params_from_iter(params))?;
    }

    let updated = select_fuel_ins(&by_id, None, 0, &transaction)?;
    transaction.commit()?;

    Ok(updated)
}

/// Delete every record matching `filter` and return how many were deleted.
///
/// # Errors
/// This function will return a:
/// - [Error::DeleteMissingFuelIn] if no record matches `filter`,
/// - or [Error::SqlError] if there is some other SQL error.
pub(crate) fn delete_fuel_ins(
    filter: &FuelInFilter,
    connection: &Connection,
) -> Result<u64, Error> {
    let conditions = filter.conditions();
    let query = format!("DELETE FROM fuel_in {}", conditions.where_clause());

    let rows_affected = connection.execute(&query, params_from_iter(conditions.params.iter()))?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingFuelIn);
    }

    Ok(rows_affected as u64)
}

fn select_fuel_in_ids(
    conditions: &SqlConditions,
    connection: &Connection,
) -> Result<Vec<FuelInId>, Error> {
    let query = format!("SELECT id FROM fuel_in {}", conditions.where_clause());

    connection
        .prepare(&query)?
        .query_map(params_from_iter(conditions.params.iter()), |row| row.get(0))?
        .map(|id_result| id_result.map_err(Error::from))
        .collect()
}

fn id_list_condition(count: usize) -> String {
    let placeholders = std::iter::repeat_n("?", count)
        .collect::<Vec<_>>()
        .join(", ");
    format!("id IN ({placeholders})")
}

// ============================================================================
// TESTS
// ============================================================================
