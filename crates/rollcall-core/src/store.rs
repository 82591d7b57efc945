//! Storage seam for attendance records.

use crate::series::TimestampSeries;
use crate::types::AttendanceRecord;
use chrono::{NaiveDate, TimeDelta};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("corrupt row for {person} on {day}: {reason}")]
    Corrupt {
        person: String,
        day: String,
        reason: String,
    },
    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

/// Durable storage of one record per (person, day).
///
/// Every write must be durable before it returns.
pub trait AttendanceStore: Send + Sync {
    fn get(&self, person: &str, day: NaiveDate) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Insert the row, or fully replace `timestamps` and `total` of the
    /// existing row for the same key.
    fn upsert(
        &self,
        person: &str,
        day: NaiveDate,
        timestamps: &TimestampSeries,
        total: TimeDelta,
    ) -> Result<AttendanceRecord, StoreError>;

    /// All records, day descending then person ascending.
    fn list_all(&self) -> Result<Vec<AttendanceRecord>, StoreError>;

    /// Records for one day, person ascending.
    fn list_by_day(&self, day: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError>;

    /// Remove one row, but only while its timestamps still equal
    /// `expected`. Returns whether a row was removed; `false` means the row
    /// is gone or has been appended to since `expected` was read.
    fn delete_if_unchanged(
        &self,
        person: &str,
        day: NaiveDate,
        expected: &TimestampSeries,
    ) -> Result<bool, StoreError>;
}
