//! Sets up the application's SQLite database.

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::{
    Error,
    fuel_in::{create_fuel_in_table, create_sequence_counter_table},
    tank_balance::create_tank_balance_table,
};

/// Create all of the application tables.
///
/// The tables are created inside a single exclusive transaction, so either
/// all of the tables exist afterwards or none of them do. Calling this on an
/// already initialized database is a no-op.
///
/// # Errors
/// Returns [Error::SqlError] if any table cannot be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let transaction = Transaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_tank_balance_table(&transaction)?;
    create_fuel_in_table(&transaction)?;
    create_sequence_counter_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
