//! The running balance of each storage tank.
//!
//! This module contains:
//! - The `TankBalance` model and its `TankKey`
//! - Database functions for opening tanks and reading or changing their balance
//! - The `TankBalanceLedger`, which owns balances for the rest of the application

mod core;
mod ledger;

pub use core::{
    TankBalance, TankKey, apply_tank_delta, create_tank_balance_table, get_tank_balance,
};
pub use ledger::TankBalanceLedger;
