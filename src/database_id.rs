//! Database ID type definitions.

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseId = i64;
/// The ID of a fuel-in record.
pub type FuelInId = DatabaseId;
/// The per-store sequence code of a fuel-in record, starting at 1.
pub type SequenceCode = i64;
