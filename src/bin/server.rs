use std::{fs::OpenOptions, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::{MatchedPath, Request},
};
use axum_server::Handle;
use clap::Parser;
use rusqlite::Connection;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use fuelstation_rs::{AppConfig, AppState, HttpTankGauge, build_router, graceful_shutdown};

/// The fuel-in API server for a fuel station point of sale.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long, env = "DB_PATH")]
    db_path: String,

    /// The address to serve the API from.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: std::net::IpAddr,

    /// The port to serve the API from.
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// The cloud ledger URL for manually recorded deliveries.
    #[arg(long, env = "FUEL_IN_CLOUD_URL")]
    fuel_in_cloud_url: String,

    /// The cloud ledger URL for deliveries measured with the tank gauge.
    #[arg(long, env = "ATG_FUEL_IN_CLOUD_URL")]
    atg_fuel_in_cloud_url: String,

    /// The URL of the tank gauge's live tank feed.
    #[arg(long, env = "TANK_DATA_URL")]
    tank_data_url: String,

    /// The maximum number of fuel-in records per page.
    #[arg(long, env = "PAGE_LIMIT", default_value_t = 50)]
    page_limit: u64,

    /// How many seconds to wait for the tank gauge or cloud ledger.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 5)]
    request_timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    setup_logging();

    let args = Args::parse();

    let addr = SocketAddr::from((args.host, args.port));

    let config = AppConfig::new(
        &args.fuel_in_cloud_url,
        &args.atg_fuel_in_cloud_url,
        &args.tank_data_url,
    )
    .page_limit(args.page_limit)
    .request_timeout(Duration::from_secs(args.request_timeout_secs));

    let gauge = Arc::new(HttpTankGauge::new(
        &config.tank_data_url,
        config.request_timeout,
    ));

    let conn = Connection::open(&args.db_path).expect("Could not open the database.");
    let app_state =
        AppState::new(conn, config, gauge).expect("Could not initialize the database.");

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = add_tracing_layer(build_router(app_state));

    tracing::info!("HTTP server listening on {}", addr);
    axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .expect("The server stopped unexpectedly.");
}

fn setup_logging() {
    // RUST_LOG overrides the stdout level, the log file always gets debug logs.
    let stdout_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(stdout_filter);

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("Could not create log file");

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file))
        .with_filter(filter::LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(stdout_log)
        .with(debug_log)
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // By default, `TraceLayer` will log 5xx responses but we're doing our specific
        // logging of errors so disable that
        .on_failure(());

    router.layer(tracing_layer)
}
