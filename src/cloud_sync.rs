//! Pushes fuel-in records to the cloud ledger.

use std::sync::{Arc, Mutex};

use reqwest::StatusCode;
use rusqlite::Connection;
use serde::Serialize;
use time::Date;

use crate::{
    AppConfig, Error,
    fuel_in::{FuelInRecord, mark_fuel_in_synced},
};

/// The cloud ledger endpoints that accept fuel-in records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudEndpoint {
    /// Manually measured deliveries.
    FuelIn,
    /// Deliveries measured with the tank gauge.
    AtgFuelIn,
}

/// The result of pushing a record to the cloud ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The cloud accepted the record and it has been marked as synced.
    Delivered,
    /// The cloud could not be reached or rejected the record. The record stays pending.
    Deferred,
    /// The cloud reported that it already has the record. The record stays pending.
    ConflictAccepted,
}

/// The record as the cloud ledger expects it.
#[derive(Debug, Serialize, PartialEq)]
struct CloudFuelIn<'a> {
    #[serde(rename = "stationId")]
    station_id: &'a str,
    #[serde(rename = "stationDetailId", skip_serializing_if = "Option::is_none")]
    station_detail_id: Option<&'a str>,
    driver: &'a str,
    bowser: &'a str,
    #[serde(rename = "tankNo")]
    tank_no: i64,
    fuel_type: &'a str,
    fuel_in_code: i64,
    opening: Option<f64>,
    tank_balance: f64,
    receive_balance: String,
    receive_date: Date,
}

impl<'a> CloudFuelIn<'a> {
    fn new(record: &'a FuelInRecord, endpoint: CloudEndpoint) -> Self {
        Self {
            station_id: &record.station_id,
            station_detail_id: match endpoint {
                CloudEndpoint::FuelIn => None,
                CloudEndpoint::AtgFuelIn => Some(&record.station_id),
            },
            driver: &record.driver,
            bowser: &record.bowser,
            tank_no: record.tank_no,
            fuel_type: &record.fuel_type,
            fuel_in_code: record.sequence_code,
            opening: record.opening_volume,
            tank_balance: record.tank_balance_after,
            receive_balance: record.received_quantity.to_string(),
            receive_date: record.receive_date,
        }
    }
}

/// Sends fuel-in records to the cloud ledger and marks them as synced once accepted.
#[derive(Debug, Clone)]
pub struct CloudSyncPublisher {
    http: reqwest::Client,
    fuel_in_url: String,
    atg_fuel_in_url: String,
    db_connection: Arc<Mutex<Connection>>,
}

impl CloudSyncPublisher {
    /// Create a publisher for the cloud URLs in `config`.
    ///
    /// # Panics
    /// Panics if the HTTP client cannot be created (e.g., the TLS backend fails to initialise).
    pub fn new(config: &AppConfig, db_connection: Arc<Mutex<Connection>>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            fuel_in_url: config.fuel_in_cloud_url.clone(),
            atg_fuel_in_url: config.atg_fuel_in_cloud_url.clone(),
            db_connection,
        }
    }

    /// Push `record` to the cloud ledger `endpoint`.
    ///
    /// Publishing never fails: problems reaching the cloud are logged and
    /// reported as [SyncOutcome::Deferred], leaving the record pending.
    pub async fn publish(&self, record: &FuelInRecord, endpoint: CloudEndpoint) -> SyncOutcome {
        let url = match endpoint {
            CloudEndpoint::FuelIn => &self.fuel_in_url,
            CloudEndpoint::AtgFuelIn => &self.atg_fuel_in_url,
        };

        let response = self
            .http
            .post(url)
            .json(&CloudFuelIn::new(record, endpoint))
            .send()
            .await;

        match response {
            Ok(response) if response.status() == StatusCode::OK => {
                match self.mark_synced(record) {
                    Ok(()) => {
                        tracing::info!("Fuel-in {} synced to the cloud", record.sequence_code);
                        SyncOutcome::Delivered
                    }
                    Err(error) => {
                        tracing::error!(
                            "Fuel-in {} was accepted by the cloud but could not be marked as synced: {error}",
                            record.sequence_code
                        );
                        SyncOutcome::Deferred
                    }
                }
            }
            Ok(response) if response.status() == StatusCode::CONFLICT => {
                tracing::info!(
                    "The cloud already has fuel-in {}, leaving it pending",
                    record.sequence_code
                );
                SyncOutcome::ConflictAccepted
            }
            Ok(response) => {
                tracing::warn!(
                    "The cloud rejected fuel-in {} with status {}",
                    record.sequence_code,
                    response.status()
                );
                SyncOutcome::Deferred
            }
            Err(error) if error.is_timeout() => {
                tracing::warn!(
                    "Timed out sending fuel-in {} to the cloud",
                    record.sequence_code
                );
                SyncOutcome::Deferred
            }
            Err(error) => {
                tracing::warn!(
                    "Could not send fuel-in {} to the cloud: {error}",
                    record.sequence_code
                );
                SyncOutcome::Deferred
            }
        }
    }

    fn mark_synced(&self, record: &FuelInRecord) -> Result<(), Error> {
        let connection = self
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        mark_fuel_in_synced(record.id, &connection).map(|_| ())
    }
}
