//! Merge one sighting into the per-day attendance record.

use crate::store::{AttendanceStore, StoreError};
use crate::types::{AttendanceRecord, EVENT_FORMAT};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Idle per-key locks are pruned once the table grows past this size.
const LOCK_TABLE_PRUNE_AT: usize = 1024;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("event has no person")]
    MissingPerson,
    #[error("malformed event timestamp {0:?}: expected YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// Rejected at the boundary; nothing was written.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ReconcileError::MissingPerson | ReconcileError::InvalidTimestamp(_)
        )
    }
}

/// Destination for just-written records.
///
/// `push` must return promptly and must not fail the caller: delivery is
/// best effort and happens off the write path.
pub trait Mirror: Send + Sync {
    fn push(&self, record: &AttendanceRecord);
}

/// Mirror used when no remote endpoint is configured.
pub struct NullMirror;

impl Mirror for NullMirror {
    fn push(&self, record: &AttendanceRecord) {
        tracing::trace!(person = %record.person, day = %record.day, "mirror disabled; not forwarding");
    }
}

/// Parse an inbound `YYYY-MM-DD HH:MM:SS` timestamp. Leap seconds (`:60`)
/// are rejected.
pub fn parse_event_time(raw: &str) -> Result<NaiveDateTime, ReconcileError> {
    NaiveDateTime::parse_from_str(raw.trim(), EVENT_FORMAT)
        .ok()
        .filter(|at| !is_leap_second(at))
        .ok_or_else(|| ReconcileError::InvalidTimestamp(raw.to_string()))
}

fn is_leap_second(at: &NaiveDateTime) -> bool {
    at.nanosecond() >= 1_000_000_000
}

type Key = (String, NaiveDate);

/// One mutex per (person, day) so read-append-write cycles on the same key
/// never interleave while distinct keys proceed in parallel.
#[derive(Default)]
struct KeyLocks {
    slots: Mutex<HashMap<Key, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    fn slot(&self, person: &str, day: NaiveDate) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.len() >= LOCK_TABLE_PRUNE_AT {
            // Only the table holds an idle slot.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        }
        slots
            .entry((person.to_string(), day))
            .or_default()
            .clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Turns sightings into store mutations.
pub struct ReconciliationService<S> {
    store: Arc<S>,
    mirror: Arc<dyn Mirror>,
    locks: KeyLocks,
}

impl<S: AttendanceStore> ReconciliationService<S> {
    pub fn new(store: Arc<S>, mirror: Arc<dyn Mirror>) -> Self {
        Self {
            store,
            mirror,
            locks: KeyLocks::default(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Record a sighting of `person` at `event_time` (`YYYY-MM-DD HH:MM:SS`).
    ///
    /// Every call appends one entry; callers de-duplicate. Validation
    /// failures write nothing. Storage failures are returned as-is and never
    /// retried, since a retried append could count the event twice.
    pub fn record(&self, person: &str, event_time: &str) -> Result<AttendanceRecord, ReconcileError> {
        if person.trim().is_empty() {
            return Err(ReconcileError::MissingPerson);
        }
        let at = parse_event_time(event_time)?;
        self.record_at(person, at)
    }

    pub fn record_at(&self, person: &str, at: NaiveDateTime) -> Result<AttendanceRecord, ReconcileError> {
        let person = person.trim();
        if person.is_empty() {
            return Err(ReconcileError::MissingPerson);
        }
        if is_leap_second(&at) {
            return Err(ReconcileError::InvalidTimestamp(at.format(EVENT_FORMAT).to_string()));
        }
        let day = at.date();

        let record = {
            let slot = self.locks.slot(person, day);
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

            let mut series = self
                .store
                .get(person, day)?
                .map(|existing| existing.timestamps)
                .unwrap_or_default();
            series.append(at.time());
            let total = series.compute_duration();

            self.store.upsert(person, day, &series, total)?
        };

        tracing::info!(
            person,
            %day,
            entries = record.timestamps.len(),
            open = record.timestamps.is_open(),
            total = %record.total_hours(),
            "attendance recorded"
        );

        self.mirror.push(&record);
        Ok(record)
    }
}
