//! The JSON route handlers for fuel-in records, gauge deliveries and tank balances.

use axum::{
    Json,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::{
    AppState, Error,
    atg::{AtgOpenRequest, AtgReconciler},
    database_id::FuelInId,
    fuel_in::{FuelInFilter, FuelInPatch, FuelInRecord, FuelInRecorder, FuelInRequest},
    pagination::Page,
    tank_balance::{TankBalance, TankBalanceLedger, TankKey},
};

/// The state needed to manage fuel-in records.
#[derive(Debug, Clone)]
pub struct FuelInState {
    recorder: FuelInRecorder,
}

impl FromRef<AppState> for FuelInState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            recorder: state.recorder.clone(),
        }
    }
}

/// The state needed to open and close gauge deliveries.
#[derive(Debug, Clone)]
pub struct AtgState {
    reconciler: AtgReconciler,
}

impl FromRef<AppState> for AtgState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            reconciler: state.reconciler.clone(),
        }
    }
}

/// The state needed to open tanks and read their balances.
#[derive(Debug, Clone)]
pub struct TankState {
    ledger: TankBalanceLedger,
}

impl FromRef<AppState> for TankState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            ledger: state.ledger.clone(),
        }
    }
}

/// The page of results to return. Pages count from 1.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    page: Option<u64>,
}

/// An exclusive range of creation times, as RFC 3339 timestamps.
#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    #[serde(with = "time::serde::rfc3339")]
    start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    end: OffsetDateTime,
    page: Option<u64>,
}

/// The station whose tanks to list.
#[derive(Debug, Deserialize)]
pub struct StationQuery {
    station_id: String,
}

/// The details needed to start tracking a tank's balance.
#[derive(Debug, Deserialize)]
pub struct OpenTankRequest {
    #[serde(flatten)]
    key: TankKey,
    balance: f64,
}

/// A route handler for recording a manually measured delivery.
pub async fn create_fuel_in_endpoint(
    State(state): State<FuelInState>,
    Json(request): Json<FuelInRequest>,
) -> Result<(StatusCode, Json<FuelInRecord>), Error> {
    let record = state.recorder.create(request).await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// A route handler for getting a single fuel-in record.
pub async fn get_fuel_in_endpoint(
    State(state): State<FuelInState>,
    Path(fuel_in_id): Path<FuelInId>,
) -> Result<Json<FuelInRecord>, Error> {
    state.recorder.get(fuel_in_id).map(Json)
}

/// A route handler for listing a page of the fuel-in records matching the query.
pub async fn list_fuel_in_endpoint(
    State(state): State<FuelInState>,
    Query(filter): Query<FuelInFilter>,
    Query(page_query): Query<PageQuery>,
) -> Result<Json<Page<FuelInRecord>>, Error> {
    state
        .recorder
        .list_page(&filter, page_query.page)
        .map(Json)
}

/// A route handler for listing a page of the fuel-in records created within a date range.
pub async fn list_fuel_in_by_date_endpoint(
    State(state): State<FuelInState>,
    Query(filter): Query<FuelInFilter>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<Page<FuelInRecord>>, Error> {
    state
        .recorder
        .list_by_date_range(&filter, range.start, range.end, range.page)
        .map(Json)
}

/// A route handler for patching every fuel-in record matching the query.
pub async fn update_fuel_in_endpoint(
    State(state): State<FuelInState>,
    Query(filter): Query<FuelInFilter>,
    Json(patch): Json<FuelInPatch>,
) -> Result<Json<Vec<FuelInRecord>>, Error> {
    state.recorder.update(&filter, &patch).map(Json)
}

/// A route handler for deleting every fuel-in record matching the query.
pub async fn delete_fuel_in_endpoint(
    State(state): State<FuelInState>,
    Query(filter): Query<FuelInFilter>,
) -> Result<Json<Value>, Error> {
    let deleted = state.recorder.delete(&filter)?;

    Ok(Json(json!({ "deleted": deleted })))
}

/// A route handler for opening a delivery measured with the tank gauge.
pub async fn open_atg_fuel_in_endpoint(
    State(state): State<AtgState>,
    Json(request): Json<AtgOpenRequest>,
) -> Result<(StatusCode, Json<FuelInRecord>), Error> {
    let record = state.reconciler.open(request).await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// A route handler for closing a delivery measured with the tank gauge.
pub async fn close_atg_fuel_in_endpoint(
    State(state): State<AtgState>,
    Path(fuel_in_id): Path<FuelInId>,
) -> Result<Json<FuelInRecord>, Error> {
    state.reconciler.close(fuel_in_id).await.map(Json)
}

/// A route handler for starting to track a tank's balance.
pub async fn open_tank_endpoint(
    State(state): State<TankState>,
    Json(request): Json<OpenTankRequest>,
) -> Result<(StatusCode, Json<TankBalance>), Error> {
    if !request.balance.is_finite() {
        return Err(Error::InvalidRequest("balance must be a number".to_owned()));
    }

    let balance = state.ledger.open_tank(&request.key, request.balance)?;

    Ok((StatusCode::CREATED, Json(balance)))
}

/// A route handler for listing the balance of every tank at a station.
pub async fn list_tank_balances_endpoint(
    State(state): State<TankState>,
    Query(query): Query<StationQuery>,
) -> Result<Json<Vec<TankBalance>>, Error> {
    state.ledger.list_balances(&query.station_id).map(Json)
}
