use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use rusqlite::Connection;
use time::OffsetDateTime;

use crate::{Error, database_id::FuelInId};

use super::{
    core::FuelInRecord,
    query::{FuelInFilter, select_fuel_ins},
};

/// Every fuel-in record matching a filter, most recently created first.
///
/// Records are fetched lazily in batches. Each call to [FuelInCursor::iter]
/// starts again from the most recent record.
#[derive(Debug, Clone)]
pub struct FuelInCursor {
    db_connection: Arc<Mutex<Connection>>,
    filter: FuelInFilter,
    batch_size: u64,
}

impl FuelInCursor {
    pub(crate) fn new(
        db_connection: Arc<Mutex<Connection>>,
        filter: FuelInFilter,
        batch_size: u64,
    ) -> Self {
        Self {
            db_connection,
            filter,
            batch_size: batch_size.max(1),
        }
    }

    /// Iterate over the matching records.
    pub fn iter(&self) -> FuelInIter<'_> {
        FuelInIter {
            cursor: self,
            buffer: VecDeque::new(),
            last_seen: None,
            exhausted: false,
        }
    }

    /// Fetch the batch of records that come after `last_seen`.
    ///
    /// Batches are keyed on the last record seen rather than an offset, so
    /// records created while iterating do not shift later batches.
    fn fetch_after(
        &self,
        last_seen: Option<(OffsetDateTime, FuelInId)>,
    ) -> Result<Vec<FuelInRecord>, Error> {
        let mut conditions = self.filter.conditions();
        if let Some((created_at, id)) = last_seen {
            conditions.push(
                "(created_at < ? OR (created_at = ? AND id < ?))",
                vec![Box::new(created_at), Box::new(created_at), Box::new(id)],
            );
        }

        let connection = self.db_connection.lock().map_err(|error| {
            tracing::error!("Could not acquire database lock: {error}");
            Error::DatabaseLockError
        })?;

        select_fuel_ins(&conditions, Some(self.batch_size), 0, &connection)
    }
}

impl<'a> IntoIterator for &'a FuelInCursor {
    type Item = Result<FuelInRecord, Error>;
    type IntoIter = FuelInIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over a [FuelInCursor].
///
/// Iteration stops after the last record, or after the first error.
#[derive(Debug)]
pub struct FuelInIter<'a> {
    cursor: &'a FuelInCursor,
    buffer: VecDeque<FuelInRecord>,
    last_seen: Option<(OffsetDateTime, FuelInId)>,
    exhausted: bool,
}

impl Iterator for FuelInIter<'_> {
    type Item = Result<FuelInRecord, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(record) = self.buffer.pop_front() {
            return Some(Ok(record));
        }

        if self.exhausted {
            return None;
        }

        match self.cursor.fetch_after(self.last_seen) {
            Ok(batch) => {
                if (batch.len() as u64) < self.cursor.batch_size {
                    self.exhausted = true;
                }

                if let Some(last) = batch.last() {
                    self.last_seen = Some((last.created_at, last.id));
                }

                self.buffer.extend(batch);
                self.buffer.pop_front().map(Ok)
            }
            Err(error) => {
                self.exhausted = true;
                Some(Err(error))
            }
        }
    }
}
