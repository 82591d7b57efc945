use crate::series::{format_duration, TimestampSeries};
use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

/// Format of inbound event timestamps.
pub const EVENT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format of the `day` partition key.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Canonical attendance for one person on one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    /// Stable identifier as received; never case-normalized.
    pub person: String,
    pub day: NaiveDate,
    pub timestamps: TimestampSeries,
    /// Derived from `timestamps`; cached for readers.
    pub total: TimeDelta,
}

impl AttendanceRecord {
    /// Build a record whose total is derived from `timestamps`.
    pub fn new(person: impl Into<String>, day: NaiveDate, timestamps: TimestampSeries) -> Self {
        let total = timestamps.compute_duration();
        Self {
            person: person.into(),
            day,
            timestamps,
            total,
        }
    }

    /// Person name for display: first letter upper-case, remainder lower-case.
    pub fn display_name(&self) -> String {
        display_name(&self.person)
    }

    pub fn total_hours(&self) -> String {
        format_duration(self.total)
    }

    pub fn to_payload(&self) -> MirrorPayload {
        MirrorPayload {
            name: self.person.clone(),
            day: self.day.format(DAY_FORMAT).to_string(),
            login_logout: self.timestamps.to_delimited(),
            total_hours: self.total_hours(),
        }
    }
}

pub fn display_name(person: &str) -> String {
    let mut chars = person.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Event emitted by the recognition side whenever a known face is seen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(default)]
    pub person: String,
    /// `YYYY-MM-DD HH:MM:SS`
    #[serde(default)]
    pub timestamp: String,
}

/// Body pushed to the remote mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorPayload {
    pub name: String,
    pub day: String,
    pub login_logout: String,
    pub total_hours: String,
}

/// One row of the presentation read surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRow {
    /// 1-based position in day-descending, person-ascending order.
    pub rank: usize,
    pub person: String,
    pub day: String,
    /// `"first - last"` or `"No Record"`.
    pub session: String,
    pub total_hours: String,
}

/// Number already-ordered records for display. Ranks are positional and
/// recomputed on every read.
pub fn rank_rows(records: &[AttendanceRecord]) -> Vec<AttendanceRow> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| AttendanceRow {
            rank: i + 1,
            person: r.display_name(),
            day: r.day.format(DAY_FORMAT).to_string(),
            session: r.timestamps.render(),
            total_hours: r.total_hours(),
        })
        .collect()
}

/// A stored record as returned to event submitters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordView {
    pub person: String,
    pub day: String,
    pub timestamps: Vec<String>,
    pub total_hours: String,
    pub open_session: bool,
}

impl From<&AttendanceRecord> for RecordView {
    fn from(r: &AttendanceRecord) -> Self {
        Self {
            person: r.person.clone(),
            day: r.day.format(DAY_FORMAT).to_string(),
            timestamps: r.timestamps.entries().iter().map(ToString::to_string).collect(),
            total_hours: r.total_hours(),
            open_session: r.timestamps.is_open(),
        }
    }
}
