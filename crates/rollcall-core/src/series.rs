//! Ordered per-day login/logout timestamps and the duration derived from them.
//!
//! Entries alternate login, logout, login, ... by position. The series never
//! reorders: arrival order is the session order, even when a later entry has
//! an earlier clock value (a session that crossed midnight).

use chrono::{NaiveTime, TimeDelta};
use std::fmt;

/// Time-of-day format used in storage and on the wire.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Sentinel rendered for a day with no entries.
pub const NO_RECORD: &str = "No Record";

/// Separator between entries in the delimited form.
const DELIMITER: &str = ", ";

/// Tags written by older revisions in front of each entry.
const LEGACY_PREFIXES: [&str; 2] = ["Login:", "Logout:"];

/// One entry of a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stamp {
    Time(NaiveTime),
    /// A stored entry that failed to parse. Kept verbatim so that rewriting
    /// the record does not lose it.
    Malformed(String),
}

impl Stamp {
    /// Parse one stored entry, accepting a legacy `Login:`/`Logout:` tag.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let bare = LEGACY_PREFIXES
            .iter()
            .find_map(|p| trimmed.strip_prefix(p))
            .unwrap_or(trimmed)
            .trim();

        match NaiveTime::parse_from_str(bare, TIME_FORMAT) {
            Ok(t) => Stamp::Time(t),
            Err(_) => Stamp::Malformed(trimmed.to_string()),
        }
    }

    pub fn time(&self) -> Option<NaiveTime> {
        match self {
            Stamp::Time(t) => Some(*t),
            Stamp::Malformed(_) => None,
        }
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stamp::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            Stamp::Malformed(raw) => f.write_str(raw),
        }
    }
}

impl From<NaiveTime> for Stamp {
    fn from(t: NaiveTime) -> Self {
        Stamp::Time(t)
    }
}

/// Ordered login/logout entries for one (person, day).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampSeries {
    entries: Vec<Stamp>,
}

impl TimestampSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_times(times: impl IntoIterator<Item = NaiveTime>) -> Self {
        Self {
            entries: times.into_iter().map(Stamp::Time).collect(),
        }
    }

    /// Parse the delimited storage form (`"09:00:00, 17:00:00"`).
    ///
    /// Empty fragments are dropped. Fragments that do not parse become
    /// [`Stamp::Malformed`] rather than failing the whole series.
    pub fn parse_delimited(raw: &str) -> Self {
        let entries = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Stamp::parse)
            .collect();
        Self { entries }
    }

    /// Delimited storage/wire form.
    pub fn to_delimited(&self) -> String {
        self.entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(DELIMITER)
    }

    /// Append `t` at the end, keeping arrival order.
    pub fn append(&mut self, t: NaiveTime) {
        self.entries.push(Stamp::Time(t));
    }

    pub fn entries(&self) -> &[Stamp] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Odd length: the last login has no logout yet.
    pub fn is_open(&self) -> bool {
        self.entries.len() % 2 == 1
    }

    /// Total worked time over all complete login/logout pairs.
    ///
    /// A logout earlier than its login is taken to fall on the next day.
    /// A trailing unpaired login contributes nothing. Pairs containing a
    /// malformed entry are skipped.
    pub fn compute_duration(&self) -> TimeDelta {
        self.entries
            .chunks_exact(2)
            .enumerate()
            .filter_map(|(i, pair)| match (pair[0].time(), pair[1].time()) {
                (Some(login), Some(logout)) => Some(session_length(login, logout)),
                _ => {
                    tracing::warn!(
                        pair = i,
                        login = %pair[0],
                        logout = %pair[1],
                        "skipping session with malformed timestamp"
                    );
                    None
                }
            })
            .fold(TimeDelta::zero(), |acc, d| acc + d)
    }

    /// `"first - last"`, or [`NO_RECORD`] for an empty series. Display only.
    pub fn render(&self) -> String {
        match (self.entries.first(), self.entries.last()) {
            (Some(first), Some(last)) => format!("{first} - {last}"),
            _ => NO_RECORD.to_string(),
        }
    }
}

/// Length of one session, wrapping past midnight at most once.
fn session_length(login: NaiveTime, logout: NaiveTime) -> TimeDelta {
    let span = logout.signed_duration_since(login);
    if span < TimeDelta::zero() {
        span + TimeDelta::days(1)
    } else {
        span
    }
}

/// Format a duration as `H:MM:SS` with unpadded hours (`8:30:15`, `0:00:00`).
///
/// Hours keep counting past 24. Negative input is clamped to zero.
pub fn format_duration(d: TimeDelta) -> String {
    let secs = d.num_seconds().max(0);
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
