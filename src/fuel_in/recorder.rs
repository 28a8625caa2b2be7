use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, Transaction, TransactionBehavior};
use time::{OffsetDateTime, UtcOffset};

use crate::{
    Error,
    cloud_sync::{CloudEndpoint, CloudSyncPublisher, SyncOutcome},
    database_id::FuelInId,
    pagination::{Page, PaginationConfig},
    tank_balance::{apply_tank_delta, get_tank_balance},
};

use super::{
    core::{
        DeliveryKind, FuelInRecord, FuelInRequest, NewFuelIn, SyncState, get_fuel_in,
        insert_fuel_in, next_sequence_code,
    },
    cursor::FuelInCursor,
    query::{
        FuelInFilter, FuelInPatch, count_fuel_ins, delete_fuel_ins, select_fuel_ins,
        update_fuel_ins,
    },
};

/// Records fuel deliveries and keeps the tank balances in step with them.
#[derive(Debug, Clone)]
pub struct FuelInRecorder {
    db_connection: Arc<Mutex<Connection>>,
    publisher: CloudSyncPublisher,
    pagination: PaginationConfig,
}

impl FuelInRecorder {
    /// Create a recorder that stores records in `db_connection` and pushes
    /// new records to the cloud with `publisher`.
    pub fn new(
        db_connection: Arc<Mutex<Connection>>,
        publisher: CloudSyncPublisher,
        pagination: PaginationConfig,
    ) -> Self {
        Self {
            db_connection,
            publisher,
            pagination,
        }
    }

    /// Record a manually measured delivery and push it to the cloud.
    ///
    /// The record captures the tank balance from just before the delivery,
    /// then the received quantity is added to the tank. The record is kept
    /// even if the cloud cannot be reached, in which case it stays
    /// [SyncState::Pending].
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::InvalidRequest] if `request` is missing a required field,
    /// - [Error::UnknownTank] if the tank has not been opened in the ledger,
    /// - or [Error::SqlError] if there is some other SQL error.
    pub async fn create(&self, request: FuelInRequest) -> Result<FuelInRecord, Error> {
        request.validate()?;

        let mut record = {
            let connection = self.lock()?;
            record_fuel_in(&request, OffsetDateTime::now_utc(), &connection)?
        };

        tracing::info!(
            "Recorded fuel-in {} of {} L into tank {} at station {}",
            record.sequence_code,
            record.received_quantity,
            record.tank_no,
            record.station_id
        );

        if self.publisher.publish(&record, CloudEndpoint::FuelIn).await == SyncOutcome::Delivered {
            record.sync_state = SyncState::Synced;
        }

        Ok(record)
    }

    /// Get a record by its ID.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if there is no record with `id`.
    pub fn get(&self, id: FuelInId) -> Result<FuelInRecord, Error> {
        let connection = self.lock()?;
        get_fuel_in(id, &connection)
    }

    /// Every record matching `filter`, most recently created first.
    ///
    /// Nothing is read from the database until the returned cursor is iterated.
    pub fn list(&self, filter: FuelInFilter) -> FuelInCursor {
        FuelInCursor::new(
            self.db_connection.clone(),
            filter,
            self.pagination.page_limit,
        )
    }

    /// One page of the records matching `filter`, most recently created first.
    ///
    /// `page` counts from 1, and `None` means the first page.
    pub fn list_page(
        &self,
        filter: &FuelInFilter,
        page: Option<u64>,
    ) -> Result<Page<FuelInRecord>, Error> {
        let conditions = filter.conditions();
        let page = page.unwrap_or(self.pagination.default_page);

        let connection = self.lock()?;
        let count = count_fuel_ins(&conditions, &connection)?;
        let data = select_fuel_ins(
            &conditions,
            Some(self.pagination.page_limit),
            self.pagination.offset(page),
            &connection,
        )?;

        Ok(Page { count, data })
    }

    /// One page of the records matching `filter` created strictly between
    /// `start` and `end`.
    ///
    /// # Errors
    /// Returns [Error::InvalidRequest] if `start` is after `end`.
    pub fn list_by_date_range(
        &self,
        filter: &FuelInFilter,
        start: OffsetDateTime,
        end: OffsetDateTime,
        page: Option<u64>,
    ) -> Result<Page<FuelInRecord>, Error> {
        if start > end {
            return Err(Error::InvalidRequest(format!(
                "the start of the date range ({start}) is after the end ({end})"
            )));
        }

        // Timestamps are stored as UTC text, so the bounds must be too.
        let start = start.to_offset(UtcOffset::UTC);
        let end = end.to_offset(UtcOffset::UTC);

        let mut conditions = filter.conditions();
        conditions.push("created_at > ?", vec![Box::new(start)]);
        conditions.push("created_at < ?", vec![Box::new(end)]);
        let page = page.unwrap_or(self.pagination.default_page);

        let connection = self.lock()?;
        let count = count_fuel_ins(&conditions, &connection)?;
        let data = select_fuel_ins(
            &conditions,
            Some(self.pagination.page_limit),
            self.pagination.offset(page),
            &connection,
        )?;

        Ok(Page { count, data })
    }

    /// Apply `patch` to every record matching `filter` and return the updated records.
    ///
    /// Patching the received quantity does not change the tank balance.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::InvalidRequest] if the patch has an invalid value,
    /// - [Error::UpdateMissingFuelIn] if no record matches `filter`,
    /// - or [Error::SqlError] if there is some other SQL error.
    pub fn update(
        &self,
        filter: &FuelInFilter,
        patch: &FuelInPatch,
    ) -> Result<Vec<FuelInRecord>, Error> {
        patch.validate()?;

        let connection = self.lock()?;
        let updated = update_fuel_ins(filter, patch, &connection)?;
        tracing::info!("Updated {} fuel-in records", updated.len());

        Ok(updated)
    }

    /// Delete every record matching `filter` and return how many were deleted.
    ///
    /// Deleting a record does not change the tank balance.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::DeleteMissingFuelIn] if no record matches `filter`,
    /// - or [Error::SqlError] if there is some other SQL error.
    pub fn delete(&self, filter: &FuelInFilter) -> Result<u64, Error> {
        let connection = self.lock()?;
        let deleted = delete_fuel_ins(filter, &connection)?;
        tracing::info!("Deleted {deleted} fuel-in records");

        Ok(deleted)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.db_connection.lock().map_err(|error| {
            tracing::error!("Could not acquire database lock: {error}");
            Error::DatabaseLockError
        })
    }
}

/// Store a manual delivery and add it to the tank balance.
///
/// The balance read, the sequence code, the new record and the balance
/// change are committed together or not at all.
///
/// # Errors
/// This function will return a:
/// - [Error::UnknownTank] if the tank has not been opened in the ledger,
/// - or [Error::SqlError] if there is some other SQL error.
pub(crate) fn record_fuel_in(
    request: &FuelInRequest,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<FuelInRecord, Error> {
    let transaction = Transaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    let key = request.tank_key();
    let balance_before = get_tank_balance(&key, &transaction)?;
    let sequence_code = next_sequence_code(&transaction)?;

    let record = insert_fuel_in(
        &NewFuelIn {
            station_id: &request.station_id,
            fuel_type: &request.fuel_type,
            tank_no: request.tank_no,
            sequence_code,
            opening_volume: None,
            tank_balance_after: balance_before.balance,
            received_quantity: request.received_quantity,
            receive_date: request.receive_date,
            driver: &request.driver,
            bowser: &request.bowser,
            kind: DeliveryKind::Manual,
            created_at: now,
        },
        &transaction,
    )?;

    apply_tank_delta(&key, request.received_quantity, now, &transaction)?;

    transaction.commit()?;

    Ok(record)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use httpmock::prelude::*;
    use rusqlite::Connection;
    use time::{
        OffsetDateTime,
        macros::{date, offset},
    };

    use crate::{
        AppConfig, Error,
        cloud_sync::CloudSyncPublisher,
        db::initialize,
        fuel_in::{
            core::{FuelInRequest, SyncState, get_fuel_in},
            query::{FuelInFilter, FuelInPatch},
        },
        tank_balance::{TankBalanceLedger, TankKey},
    };

    use super::{FuelInRecorder, record_fuel_in};

    const FUEL_IN_PATH: &str = "/api/fuel-in";
    const ATG_PATH: &str = "/api/atg-fuel-in";

    struct Fixture {
        recorder: FuelInRecorder,
        ledger: TankBalanceLedger,
        db_connection: Arc<Mutex<Connection>>,
    }

    fn get_fixture(server: &MockServer, page_limit: u64) -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let db_connection = Arc::new(Mutex::new(conn));

        let config = AppConfig::new(
            &server.url(FUEL_IN_PATH),
            &server.url(ATG_PATH),
            &server.url("/baseOilcan"),
        )
        .page_limit(page_limit)
        .request_timeout(Duration::from_secs(2));
        let publisher = CloudSyncPublisher::new(&config, db_connection.clone());

        let ledger = TankBalanceLedger::new(db_connection.clone());
        ledger.open_tank(&diesel_tank(), 500.0).unwrap();

        Fixture {
            recorder: FuelInRecorder::new(db_connection.clone(), publisher, config.pagination),
            ledger,
            db_connection,
        }
    }

    fn diesel_tank() -> TankKey {
        TankKey::new("station-1", "004-Diesel", 1)
    }

    fn request(received_quantity: f64) -> FuelInRequest {
        FuelInRequest {
            station_id: "station-1".to_owned(),
            fuel_type: "004-Diesel".to_owned(),
            tank_no: 1,
            receive_date: date!(2025 - 06 - 01),
            received_quantity,
            driver: "Aung".to_owned(),
            bowser: "YGN-1234".to_owned(),
        }
    }

    async fn cloud_accepts(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(POST).path(FUEL_IN_PATH);
                then.status(200);
            })
            .await;
    }

    #[tokio::test]
    async fn create_records_balance_before_and_applies_delta() {
        let server = MockServer::start_async().await;
        cloud_accepts(&server).await;
        let fixture = get_fixture(&server, 50);

        let record = fixture.recorder.create(request(200.0)).await.unwrap();

        assert_eq!(record.tank_balance_after, 500.0);
        assert_eq!(record.received_quantity, 200.0);
        assert_eq!(record.sequence_code, 1);
        assert_eq!(record.sync_state, SyncState::Synced);
        let balance = fixture.ledger.get_balance(&diesel_tank()).unwrap();
        assert_eq!(balance.balance, 700.0, "want 500 + 200 L, got {}", balance.balance);
        assert_eq!(balance.last_fuel_in, 200.0);
    }

    #[tokio::test]
    async fn create_keeps_record_when_cloud_fails() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(FUEL_IN_PATH);
                then.status(500);
            })
            .await;
        let fixture = get_fixture(&server, 50);

        let record = fixture.recorder.create(request(200.0)).await.unwrap();

        assert_eq!(record.sync_state, SyncState::Pending);
        let stored = get_fuel_in(record.id, &fixture.db_connection.lock().unwrap()).unwrap();
        assert_eq!(stored, record);
        assert_eq!(
            fixture.ledger.get_balance(&diesel_tank()).unwrap().balance,
            700.0
        );
    }

    #[tokio::test]
    async fn create_for_unknown_tank_persists_nothing() {
        let server = MockServer::start_async().await;
        let cloud = server
            .mock_async(|when, then| {
                when.method(POST).path(FUEL_IN_PATH);
                then.status(200);
            })
            .await;
        let fixture = get_fixture(&server, 50);
        let mut unknown = request(200.0);
        unknown.tank_no = 9;

        let result = fixture.recorder.create(unknown).await;

        assert!(
            matches!(result, Err(Error::UnknownTank { tank_no: 9, .. })),
            "want unknown tank error, got {result:?}"
        );
        cloud.assert_hits_async(0).await;
        assert_eq!(fixture.recorder.list(FuelInFilter::default()).iter().count(), 0);
    }

    #[tokio::test]
    async fn create_rejects_invalid_request() {
        let server = MockServer::start_async().await;
        let fixture = get_fixture(&server, 50);
        let mut invalid = request(200.0);
        invalid.bowser = String::new();

        let result = fixture.recorder.create(invalid).await;

        assert_eq!(
            result,
            Err(Error::InvalidRequest("bowser must not be empty".to_owned()))
        );
    }

    #[tokio::test]
    async fn sequence_codes_follow_creation_order() {
        let server = MockServer::start_async().await;
        cloud_accepts(&server).await;
        let fixture = get_fixture(&server, 50);

        let mut codes = Vec::new();
        for _ in 0..3 {
            codes.push(fixture.recorder.create(request(10.0)).await.unwrap().sequence_code);
        }

        assert_eq!(codes, vec![1, 2, 3]);
    }

    #[test]
    fn concurrent_creates_get_unique_codes_and_consistent_balance() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let db_connection = Arc::new(Mutex::new(conn));
        TankBalanceLedger::new(db_connection.clone())
            .open_tank(&diesel_tank(), 0.0)
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db_connection = db_connection.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .map(|_| {
                            let connection = db_connection.lock().unwrap();
                            record_fuel_in(&request(5.0), OffsetDateTime::now_utc(), &connection)
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut records: Vec<_> = handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("create thread panicked"))
            .collect();
        records.sort_by_key(|record| record.sequence_code);

        let codes: Vec<i64> = records.iter().map(|record| record.sequence_code).collect();
        assert_eq!(codes, (1..=80).collect::<Vec<_>>());
        for record in &records {
            assert_eq!(
                record.tank_balance_after,
                (record.sequence_code - 1) as f64 * 5.0,
                "record {} should see the balance left by every earlier record",
                record.sequence_code
            );
        }
        let balance = TankBalanceLedger::new(db_connection)
            .get_balance(&diesel_tank())
            .unwrap();
        assert_eq!(balance.balance, 400.0);
    }

    #[tokio::test]
    async fn list_page_uses_page_limit() {
        let server = MockServer::start_async().await;
        cloud_accepts(&server).await;
        let fixture = get_fixture(&server, 2);
        for _ in 0..5 {
            fixture.recorder.create(request(10.0)).await.unwrap();
        }

        let first = fixture
            .recorder
            .list_page(&FuelInFilter::default(), None)
            .unwrap();
        let last = fixture
            .recorder
            .list_page(&FuelInFilter::default(), Some(3))
            .unwrap();

        assert_eq!(first.count, 5);
        let first_codes: Vec<i64> = first.data.iter().map(|r| r.sequence_code).collect();
        assert_eq!(first_codes, vec![5, 4]);
        let last_codes: Vec<i64> = last.data.iter().map(|r| r.sequence_code).collect();
        assert_eq!(last_codes, vec![1]);
    }

    #[tokio::test]
    async fn list_by_date_range_excludes_bounds() {
        let server = MockServer::start_async().await;
        cloud_accepts(&server).await;
        let fixture = get_fixture(&server, 50);
        let record = fixture.recorder.create(request(10.0)).await.unwrap();
        let filter = FuelInFilter::default();

        let around = fixture
            .recorder
            .list_by_date_range(
                &filter,
                record.created_at - time::Duration::seconds(1),
                record.created_at + time::Duration::seconds(1),
                None,
            )
            .unwrap();
        let from_exact_start = fixture
            .recorder
            .list_by_date_range(
                &filter,
                record.created_at,
                record.created_at + time::Duration::seconds(1),
                None,
            )
            .unwrap();

        assert_eq!(around.count, 1);
        assert_eq!(around.data, vec![record]);
        assert_eq!(from_exact_start.count, 0, "the start bound should be exclusive");
    }

    #[tokio::test]
    async fn list_by_date_range_compares_instants_across_offsets() {
        let server = MockServer::start_async().await;
        cloud_accepts(&server).await;
        let fixture = get_fixture(&server, 50);
        let record = fixture.recorder.create(request(10.0)).await.unwrap();
        let filter = FuelInFilter::default();
        let start = record.created_at - time::Duration::hours(1);
        let end = record.created_at + time::Duration::hours(1);

        for utc_offset in [offset!(+6:30), offset!(-5)] {
            let got = fixture
                .recorder
                .list_by_date_range(
                    &filter,
                    start.to_offset(utc_offset),
                    end.to_offset(utc_offset),
                    None,
                )
                .unwrap();

            assert_eq!(got.count, 1, "bounds at offset {utc_offset}");
            assert_eq!(got.data, vec![record.clone()]);
        }
    }

    #[tokio::test]
    async fn list_page_past_the_end_is_empty() {
        let server = MockServer::start_async().await;
        cloud_accepts(&server).await;
        let fixture = get_fixture(&server, 2);
        fixture.recorder.create(request(10.0)).await.unwrap();

        let got = fixture
            .recorder
            .list_page(&FuelInFilter::default(), Some(u64::MAX))
            .unwrap();

        assert_eq!(got.count, 1);
        assert!(got.data.is_empty());
    }

    #[tokio::test]
    async fn list_by_date_range_rejects_reversed_range() {
        let server = MockServer::start_async().await;
        let fixture = get_fixture(&server, 50);
        let now = OffsetDateTime::now_utc();

        let result = fixture.recorder.list_by_date_range(
            &FuelInFilter::default(),
            now,
            now - time::Duration::days(1),
            None,
        );

        assert!(
            matches!(result, Err(Error::InvalidRequest(_))),
            "want invalid request error, got {result:?}"
        );
    }

    #[tokio::test]
    async fn update_then_get() {
        let server = MockServer::start_async().await;
        cloud_accepts(&server).await;
        let fixture = get_fixture(&server, 50);
        let record = fixture.recorder.create(request(10.0)).await.unwrap();
        let patch = FuelInPatch {
            bowser: Some("MDY-9876".to_owned()),
            ..Default::default()
        };

        let updated = fixture
            .recorder
            .update(&FuelInFilter::default().station_id("station-1"), &patch)
            .unwrap();

        assert_eq!(updated.len(), 1);
        assert_eq!(fixture.recorder.get(record.id).unwrap().bowser, "MDY-9876");
        assert_eq!(
            fixture.recorder.get(record.id).unwrap().sync_state,
            SyncState::Synced,
            "patching should not reset the sync state"
        );
    }

    #[tokio::test]
    async fn delete_then_get_fails() {
        let server = MockServer::start_async().await;
        cloud_accepts(&server).await;
        let fixture = get_fixture(&server, 50);
        let record = fixture.recorder.create(request(10.0)).await.unwrap();

        let deleted = fixture.recorder.delete(&FuelInFilter::default().tank_no(1));

        assert_eq!(deleted, Ok(1));
        assert_eq!(fixture.recorder.get(record.id), Err(Error::NotFound));
        assert_eq!(
            fixture.recorder.delete(&FuelInFilter::default().tank_no(1)),
            Err(Error::DeleteMissingFuelIn)
        );
    }
}
