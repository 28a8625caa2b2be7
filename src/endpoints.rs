//! The API endpoints URIs.

/// The route to create, list, update and delete fuel-in records.
pub const FUEL_IN: &str = "/api/fuel-in";
/// The route to get a single fuel-in record.
pub const FUEL_IN_BY_ID: &str = "/api/fuel-in/{fuel_in_id}";
/// The route to list fuel-in records created within a date range.
pub const FUEL_IN_BY_DATE: &str = "/api/fuel-in/by-date";
/// The route to open a delivery measured with the tank gauge.
pub const ATG_FUEL_IN: &str = "/api/atg-fuel-in";
/// The route to close a delivery measured with the tank gauge.
pub const CLOSE_ATG_FUEL_IN: &str = "/api/atg-fuel-in/{fuel_in_id}/close";
/// The route to open tanks and list their balances.
pub const TANK_BALANCES: &str = "/api/tank-balances";
