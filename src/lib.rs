//! Fuel-in reconciliation for a fuel station point of sale.
//!
//! This library records fuel deliveries ("fuel-in" events) against the
//! running balance of each storage tank, optionally measures deliveries with
//! an automatic tank gauge (ATG), and pushes each completed delivery to the
//! cloud ledger. The cloud may be unreachable: local records are always kept
//! and carry a [SyncState] telling whether the cloud has acknowledged them.
//!
//! The operations are exposed as a small JSON API, see [build_router].

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
mod atg;
mod cloud_sync;
mod config;
mod database_id;
mod db;
mod endpoints;
mod fuel_in;
mod fuel_type;
mod gauge;
mod handlers;
mod pagination;
mod routing;
mod tank_balance;

pub use app_state::AppState;
pub use atg::{AtgOpenRequest, AtgReconciler};
pub use cloud_sync::{CloudEndpoint, CloudSyncPublisher, SyncOutcome};
pub use config::AppConfig;
pub use database_id::{DatabaseId, FuelInId, SequenceCode};
pub use db::initialize as initialize_db;
pub use fuel_in::{
    DeliveryKind, FuelInCursor, FuelInFilter, FuelInIter, FuelInPatch, FuelInRecord,
    FuelInRecorder, FuelInRequest, SyncState,
};
pub use fuel_type::fuel_type_for_oil_type;
pub use gauge::{HttpTankGauge, TankGauge, TankReading};
pub use pagination::{Page, PaginationConfig};
pub use routing::build_router;
pub use tank_balance::{TankBalance, TankBalanceLedger, TankKey};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// There is no tank balance for the station, fuel type and tank number.
    ///
    /// A tank must be opened in the ledger before fuel can be received into it.
    #[error("no tank balance for station {station_id}, fuel type {fuel_type}, tank {tank_no}")]
    UnknownTank {
        /// The station that owns the tank.
        station_id: String,
        /// The fuel type code stored in the tank.
        fuel_type: String,
        /// The tank number within the station.
        tank_no: i64,
    },

    /// Tried to update fuel-in records but none matched the filter.
    #[error("tried to update fuel-in records that are not in the database")]
    UpdateMissingFuelIn,

    /// Tried to delete fuel-in records but none matched the filter.
    #[error("tried to delete fuel-in records that are not in the database")]
    DeleteMissingFuelIn,

    /// The request is missing a required field or has an invalid value.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Tried to close an ATG delivery that is not open.
    ///
    /// Only records created by [AtgReconciler::open] and not yet closed can be
    /// closed.
    #[error("fuel-in {0} is not an open ATG delivery")]
    DeliveryNotOpen(FuelInId),

    /// The tank gauge reported an oil type with no matching fuel type code.
    #[error("the tank gauge reported an unknown oil type \"{0}\"")]
    UnmappedOilType(String),

    /// An external service (tank gauge or cloud ledger) could not be reached
    /// or did not respond in time.
    #[error("external service unavailable: {0}")]
    Unavailable(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound
            | Error::UnknownTank { .. }
            | Error::UpdateMissingFuelIn
            | Error::DeleteMissingFuelIn => StatusCode::NOT_FOUND,
            Error::InvalidRequest(_) | Error::DeliveryNotOpen(_) | Error::UnmappedOilType(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::SqlError(_) | Error::DatabaseLockError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Storage faults are logged but the details are not intended to be shown to the client.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("An unexpected error occurred: {}", self);
            "An unexpected error occurred, check the server logs for more details.".to_owned()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
