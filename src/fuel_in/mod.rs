//! Fuel deliveries into a station's storage tanks.
//!
//! This module contains:
//! - The `FuelInRecord` model with its `SyncState` and `DeliveryKind`
//! - Filters and patches for querying and correcting records in bulk
//! - The `FuelInRecorder`, which records deliveries against the tank balances

mod core;
mod cursor;
mod query;
mod recorder;

pub use core::{
    DeliveryKind, FuelInRecord, FuelInRequest, SyncState, create_fuel_in_table,
    create_sequence_counter_table,
};
pub(crate) use core::{
    NewFuelIn, get_fuel_in, insert_fuel_in, mark_fuel_in_synced, next_sequence_code,
};
pub use cursor::{FuelInCursor, FuelInIter};
pub use query::{FuelInFilter, FuelInPatch};
pub use recorder::FuelInRecorder;

#[cfg(test)]
pub(crate) use query::count_fuel_ins;
#[cfg(test)]
pub(crate) use recorder::record_fuel_in;
