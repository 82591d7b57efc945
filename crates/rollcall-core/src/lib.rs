//! rollcall-core — Attendance session reconciliation.
//!
//! Turns "person seen at time T" events into one record per person per day
//! holding alternating login/logout times and the total time worked.

pub mod reconcile;
pub mod series;
pub mod store;
pub mod types;

pub use reconcile::{Mirror, NullMirror, ReconcileError, ReconciliationService};
pub use series::{format_duration, Stamp, TimestampSeries};
pub use store::{AttendanceStore, StoreError};
pub use types::{AttendanceRecord, AttendanceRow, InboundEvent, MirrorPayload, RecordView};
