//! rollcall-store — SQLite-backed attendance storage.
//!
//! One row per (name, day), enforced by a UNIQUE constraint. Timestamps are
//! persisted as a `", "`-delimited list and `total_hours` as a cached
//! `H:MM:SS` string; rows are loaded by re-deriving the total from the list.

use chrono::{NaiveDate, TimeDelta};
use rollcall_core::types::DAY_FORMAT;
use rollcall_core::{format_duration, AttendanceRecord, AttendanceStore, StoreError, TimestampSeries};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS attendance (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        day TEXT NOT NULL,
        login_logout TEXT NOT NULL,
        total_hours TEXT NOT NULL,
        UNIQUE(name, day)
    );
    CREATE INDEX IF NOT EXISTS attendance_day ON attendance(day);
";

const SELECT_COLUMNS: &str = "SELECT name, day, login_logout FROM attendance";

/// Raw column values of one row, converted outside the rusqlite closure so
/// that bad data surfaces as [`StoreError::Corrupt`].
type RawRow = (String, String, String);

/// SQLite attendance store. The connection is shared behind a mutex, so
/// the store can be used from any thread.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::backend)?;
        }
        let conn = Connection::open(path).map_err(StoreError::backend)?;
        let store = Self::init(conn)?;
        tracing::info!(path = %path.display(), "attendance store opened");
        Ok(store)
    }

    /// Private in-memory database, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().map_err(StoreError::backend)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        // synchronous = FULL: a write is on disk before upsert returns.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(StoreError::backend)?;
        conn.execute_batch(SCHEMA_SQL).map_err(StoreError::backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn).map_err(StoreError::backend)
    }

    /// Number of stored rows.
    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self.with_conn(|c| {
            c.query_row("SELECT COUNT(*) FROM attendance", [], |row| row.get(0))
        })?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    fn query_rows(&self, sql: &str, day: Option<&str>) -> Result<Vec<AttendanceRecord>, StoreError> {
        let raw: Vec<RawRow> = self.with_conn(|c| {
            let mut stmt = c.prepare(sql)?;
            let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<RawRow> {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            };
            let rows = match day {
                Some(d) => stmt.query_map([d], map)?.collect::<rusqlite::Result<Vec<_>>>()?,
                None => stmt.query_map([], map)?.collect::<rusqlite::Result<Vec<_>>>()?,
            };
            Ok(rows)
        })?;
        // A row with an unreadable key is skipped so the rest still load.
        Ok(raw
            .into_iter()
            .filter_map(|row| match to_record(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping corrupt attendance row");
                    None
                }
            })
            .collect())
    }
}

fn day_key(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

fn to_record((name, day, login_logout): RawRow) -> Result<AttendanceRecord, StoreError> {
    let day = NaiveDate::parse_from_str(&day, DAY_FORMAT).map_err(|e| StoreError::Corrupt {
        person: name.clone(),
        day: day.clone(),
        reason: format!("bad day: {e}"),
    })?;
    Ok(AttendanceRecord::new(
        name,
        day,
        TimestampSeries::parse_delimited(&login_logout),
    ))
}

impl AttendanceStore for SqliteStore {
    fn get(&self, person: &str, day: NaiveDate) -> Result<Option<AttendanceRecord>, StoreError> {
        let raw: Option<RawRow> = self.with_conn(|c| {
            c.query_row(
                &format!("{SELECT_COLUMNS} WHERE name = ?1 AND day = ?2"),
                params![person, day_key(day)],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
        })?;
        raw.map(to_record).transpose()
    }

    fn upsert(
        &self,
        person: &str,
        day: NaiveDate,
        timestamps: &TimestampSeries,
        total: TimeDelta,
    ) -> Result<AttendanceRecord, StoreError> {
        let login_logout = timestamps.to_delimited();
        let total_hours = format_duration(total);
        self.with_conn(|c| {
            c.execute(
                "INSERT INTO attendance (name, day, login_logout, total_hours)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name, day) DO UPDATE SET
                     login_logout = excluded.login_logout,
                     total_hours = excluded.total_hours",
                params![person, day_key(day), login_logout, total_hours],
            )
        })?;
        tracing::debug!(person, %day, login_logout, total_hours, "row upserted");

        Ok(AttendanceRecord {
            person: person.to_string(),
            day,
            timestamps: timestamps.clone(),
            total,
        })
    }

    fn list_all(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.query_rows(&format!("{SELECT_COLUMNS} ORDER BY day DESC, name ASC"), None)
    }

    fn list_by_day(&self, day: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.query_rows(
            &format!("{SELECT_COLUMNS} WHERE day = ?1 ORDER BY name ASC"),
            Some(&day_key(day)),
        )
    }

    fn delete_if_unchanged(
        &self,
        person: &str,
        day: NaiveDate,
        expected: &TimestampSeries,
    ) -> Result<bool, StoreError> {
        let expected = expected.to_delimited();
        let n = self.with_conn(|c| {
            c.execute(
                "DELETE FROM attendance WHERE name = ?1 AND day = ?2 AND login_logout = ?3",
                params![person, day_key(day), expected],
            )
        })?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DAY_FORMAT).unwrap()
    }

    fn series(raw: &str) -> TimestampSeries {
        TimestampSeries::parse_delimited(raw)
    }

    fn put(store: &SqliteStore, person: &str, d: &str, raw: &str) -> AttendanceRecord {
        let s = series(raw);
        let total = s.compute_duration();
        store.upsert(person, day(d), &s, total).unwrap()
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get("alice", day("2024-01-01")).unwrap().is_none());
    }

    #[test]
    fn test_upsert_inserts_then_replaces() {
        let store = SqliteStore::open_in_memory().unwrap();
        put(&store, "alice", "2024-01-01", "09:00:00");
        let replaced = put(&store, "alice", "2024-01-01", "09:00:00, 17:30:15");

        let got = store.get("alice", day("2024-01-01")).unwrap().unwrap();
        assert_eq!(got, replaced);
        assert_eq!(got.timestamps.len(), 2);
        assert_eq!(got.total_hours(), "8:30:15");
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_is_full_replace_not_merge() {
        let store = SqliteStore::open_in_memory().unwrap();
        put(&store, "alice", "2024-01-01", "09:00:00, 10:00:00, 11:00:00");
        put(&store, "alice", "2024-01-01", "12:00:00");
        let got = store.get("alice", day("2024-01-01")).unwrap().unwrap();
        assert_eq!(got.timestamps.to_delimited(), "12:00:00");
    }

    #[test]
    fn test_cached_total_hours_column() {
        let store = SqliteStore::open_in_memory().unwrap();
        put(&store, "alice", "2024-01-01", "22:00:00, 02:00:00");
        let cached: String = store
            .with_conn(|c| {
                c.query_row("SELECT total_hours FROM attendance", [], |r| r.get(0))
            })
            .unwrap();
        assert_eq!(cached, "4:00:00");
    }

    #[test]
    fn test_list_all_ordering() {
        let store = SqliteStore::open_in_memory().unwrap();
        put(&store, "carol", "2024-01-01", "09:00:00");
        put(&store, "bob", "2024-01-02", "09:00:00");
        put(&store, "alice", "2024-01-01", "09:00:00");
        put(&store, "dave", "2024-01-02", "09:00:00");

        let keys: Vec<_> = store
            .list_all()
            .unwrap()
            .into_iter()
            .map(|r| (r.day.format(DAY_FORMAT).to_string(), r.person))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("2024-01-02".to_string(), "bob".to_string()),
                ("2024-01-02".to_string(), "dave".to_string()),
                ("2024-01-01".to_string(), "alice".to_string()),
                ("2024-01-01".to_string(), "carol".to_string()),
            ]
        );
    }

    #[test]
    fn test_list_by_day() {
        let store = SqliteStore::open_in_memory().unwrap();
        put(&store, "bob", "2024-01-01", "09:00:00");
        put(&store, "alice", "2024-01-01", "09:00:00");
        put(&store, "alice", "2024-01-02", "09:00:00");

        let rows = store.list_by_day(day("2024-01-01")).unwrap();
        let people: Vec<_> = rows.iter().map(|r| r.person.as_str()).collect();
        assert_eq!(people, ["alice", "bob"]);
        assert!(store.list_by_day(day("2023-12-31")).unwrap().is_empty());
    }

    #[test]
    fn test_delete_if_unchanged() {
        let store = SqliteStore::open_in_memory().unwrap();
        let snapshot = put(&store, "alice", "2024-01-01", "09:00:00").timestamps;
        assert!(store.delete_if_unchanged("alice", day("2024-01-01"), &snapshot).unwrap());
        assert!(!store.delete_if_unchanged("alice", day("2024-01-01"), &snapshot).unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_delete_if_unchanged_keeps_appended_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let snapshot = put(&store, "alice", "2024-01-01", "09:00:00").timestamps;
        put(&store, "alice", "2024-01-01", "09:00:00, 17:00:00");

        assert!(!store.delete_if_unchanged("alice", day("2024-01-01"), &snapshot).unwrap());
        let got = store.get("alice", day("2024-01-01")).unwrap().unwrap();
        assert_eq!(got.timestamps.to_delimited(), "09:00:00, 17:00:00");
    }

    #[test]
    fn test_corrupt_pair_loads_with_partial_total() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .with_conn(|c| {
                c.execute(
                    "INSERT INTO attendance (name, day, login_logout, total_hours)
                     VALUES ('alice', '2024-01-01', 'Login: 09:00:00, Logout: 10:00:00, 11:??:00, 12:00:00', 'x')",
                    [],
                )
            })
            .unwrap();

        let got = store.get("alice", day("2024-01-01")).unwrap().unwrap();
        assert_eq!(got.timestamps.len(), 4);
        assert_eq!(got.total_hours(), "1:00:00");
    }

    #[test]
    fn test_corrupt_day_row_skipped_in_lists() {
        let store = SqliteStore::open_in_memory().unwrap();
        put(&store, "bob", "2024-01-01", "09:00:00, 10:00:00");
        store
            .with_conn(|c| {
                c.execute(
                    "INSERT INTO attendance (name, day, login_logout, total_hours)
                     VALUES ('alice', 'not-a-day', '09:00:00', '0:00:00')",
                    [],
                )
            })
            .unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].person, "bob");
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("attendance.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            put(&store, "alice", "2024-01-01", "09:00:00, 17:00:00");
        }
        let store = SqliteStore::open(&path).unwrap();
        let got = store.get("alice", day("2024-01-01")).unwrap().unwrap();
        assert_eq!(got.total_hours(), "8:00:00");
    }
}
