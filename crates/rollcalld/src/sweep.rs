//! Daily catch-up: replay yesterday's rows to the mirror.
//!
//! Live pushes are at-most-once, so the mirror may miss records that were
//! written while it was unreachable. The sweep re-lists the previous day and
//! delivers every row again, awaiting each attempt. With purge enabled, rows
//! the mirror accepted are then removed from the local store, unless they
//! were appended to while the delivery was in flight.

use crate::sync::MirrorClient;
use chrono::{Local, NaiveDate};
use rollcall_core::{AttendanceStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const SWEEP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Outcome of one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub day: NaiveDate,
    pub listed: usize,
    pub delivered: usize,
    pub purged: usize,
}

async fn blocking<S, T, F>(store: &Arc<S>, f: F) -> Result<T, StoreError>
where
    S: AttendanceStore + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T, StoreError> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(StoreError::backend)?
}

/// The day a sweep started on `today` replays.
pub fn sweep_day(today: NaiveDate) -> Option<NaiveDate> {
    today.pred_opt()
}

/// Deliver every row of `day` to the mirror; delete delivered rows when
/// `purge` is set. A failed delivery keeps its row, and so does a row that
/// changed after it was listed.
pub async fn catch_up<S>(
    store: &Arc<S>,
    client: &MirrorClient,
    day: NaiveDate,
    purge: bool,
) -> Result<SweepReport, StoreError>
where
    S: AttendanceStore + 'static,
{
    let rows = blocking(store, move |s| s.list_by_day(day)).await?;
    let mut report = SweepReport {
        day,
        listed: rows.len(),
        delivered: 0,
        purged: 0,
    };

    for record in rows {
        let payload = record.to_payload();
        if let Err(e) = client.deliver(&payload).await {
            tracing::warn!(name = %payload.name, %day, error = %e, "catch-up push failed; keeping row");
            continue;
        }
        report.delivered += 1;

        if purge {
            let person = record.person.clone();
            let delivered = record.timestamps.clone();
            if blocking(store, move |s| s.delete_if_unchanged(&person, day, &delivered)).await? {
                report.purged += 1;
            } else {
                tracing::info!(name = %payload.name, %day, "row changed since delivery; keeping it");
            }
        }
    }

    tracing::info!(
        day = %report.day,
        listed = report.listed,
        delivered = report.delivered,
        purged = report.purged,
        "catch-up sweep finished"
    );
    Ok(report)
}

/// Run the sweep now and then once a day for the previous local day.
pub fn spawn_daily<S>(store: Arc<S>, client: MirrorClient, purge: bool) -> JoinHandle<()>
where
    S: AttendanceStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_PERIOD);
        loop {
            ticker.tick().await;
            let Some(yesterday) = sweep_day(Local::now().date_naive()) else {
                continue;
            };
            if let Err(e) = catch_up(&store, &client, yesterday, purge).await {
                tracing::error!(day = %yesterday, error = %e, "catch-up sweep failed");
            }
        }
    })
}
