use std::error::Error;
use std::path::Path;
use std::process::exit;
use std::sync::{Arc, Mutex};

use clap::Parser;
use rusqlite::Connection;

use fuelstation_rs::{TankBalanceLedger, TankKey, fuel_type_for_oil_type, initialize_db};

/// A utility for creating a test database for the fuel-in API server.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,

    /// The station to open the test tanks for.
    #[arg(long, short, default_value = "station-1")]
    station_id: String,

    /// The litres to put in each test tank.
    #[arg(long, short, default_value_t = 5000.0)]
    balance: f64,
}

/// The gauge oil types of the test tanks, in tank number order.
const TEST_TANKS: [&str; 4] = ["Petrol 92", "95 Octane", "HSD", "PHSD"];

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    let ledger = TankBalanceLedger::new(Arc::new(Mutex::new(conn)));

    for (tank_no, oil_type) in (1..).zip(TEST_TANKS) {
        let fuel_type = fuel_type_for_oil_type(oil_type)
            .ok_or_else(|| format!("no fuel type for test oil type {oil_type}"))?;

        println!("Opening tank {tank_no} ({fuel_type}) with {} L...", args.balance);
        ledger.open_tank(
            &TankKey::new(&args.station_id, fuel_type, tank_no),
            args.balance,
        )?;
    }

    println!("Success!");

    Ok(())
}
