use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use rollcall_core::types::{rank_rows, DAY_FORMAT};
use rollcall_core::{
    AttendanceRow, AttendanceStore, InboundEvent, ReconcileError, ReconciliationService,
    RecordView, StoreError,
};
use rollcall_store::SqliteStore;
use serde::Serialize;
use std::sync::Arc;

/// HTTP interface of the attendance daemon.
///
/// - `POST /events` — record a sighting
/// - `GET /attendance` — ranked read surface, all days
/// - `GET /attendance/:day` — read surface for one day
/// - `GET /status` — daemon status
#[derive(Clone)]
pub struct AppState {
    service: Arc<ReconciliationService<SqliteStore>>,
    mirror_enabled: bool,
}

impl AppState {
    pub fn new(service: Arc<ReconciliationService<SqliteStore>>, mirror_enabled: bool) -> Self {
        Self {
            service,
            mirror_enabled,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        if err.is_validation() {
            ApiError::bad_request(err.to_string())
        } else {
            tracing::error!(error = %err, "event not recorded");
            ApiError::internal(err.to_string())
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "store read failed");
        ApiError::internal(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    version: &'static str,
    mirror: &'static str,
    records: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", post(record_event))
        .route("/attendance", get(list_attendance))
        .route("/attendance/:day", get(day_attendance))
        .route("/status", get(status))
        .with_state(state)
}

/// Run a store-bound closure off the async executor.
async fn blocking<T, E, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
    F: FnOnce(&ReconciliationService<SqliteStore>) -> Result<T, E> + Send + 'static,
{
    let service = state.service.clone();
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| ApiError::internal(format!("worker failed: {e}")))?
        .map_err(Into::into)
}

async fn record_event(
    State(state): State<AppState>,
    Json(event): Json<InboundEvent>,
) -> Result<Json<RecordView>, ApiError> {
    tracing::debug!(person = %event.person, timestamp = %event.timestamp, "event received");
    let record = blocking(&state, move |svc| svc.record(&event.person, &event.timestamp)).await?;
    Ok(Json(RecordView::from(&record)))
}

async fn list_attendance(State(state): State<AppState>) -> Result<Json<Vec<AttendanceRow>>, ApiError> {
    let records = blocking(&state, |svc| svc.store().list_all()).await?;
    Ok(Json(rank_rows(&records)))
}

async fn day_attendance(
    State(state): State<AppState>,
    Path(day): Path<String>,
) -> Result<Json<Vec<AttendanceRow>>, ApiError> {
    let day = NaiveDate::parse_from_str(&day, DAY_FORMAT)
        .map_err(|_| ApiError::bad_request(format!("malformed day {day:?}: expected YYYY-MM-DD")))?;
    let records = blocking(&state, move |svc| svc.store().list_by_day(day)).await?;
    Ok(Json(rank_rows(&records)))
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let records = blocking(&state, |svc| svc.store().count()).await?;
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        mirror: if state.mirror_enabled { "enabled" } else { "disabled" },
        records,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use rollcall_core::NullMirror;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<ReconciliationService<SqliteStore>>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let service = Arc::new(ReconciliationService::new(store, Arc::new(NullMirror)));
        (router(AppState::new(service.clone(), false)), service)
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn post_event(body: serde_json::Value) -> Request<Body> {
        Request::post("/events")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_post_event_records_session() {
        let (app, _) = app();
        call(&app, post_event(serde_json::json!({"person": "alice", "timestamp": "2024-01-01 09:00:00"}))).await;
        let (status, body) = call(
            &app,
            post_event(serde_json::json!({"person": "alice", "timestamp": "2024-01-01 17:30:15"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["timestamps"], serde_json::json!(["09:00:00", "17:30:15"]));
        assert_eq!(body["total_hours"], "8:30:15");
        assert_eq!(body["open_session"], false);
    }

    #[tokio::test]
    async fn test_malformed_timestamp_is_400_and_writes_nothing() {
        let (app, service) = app();
        call(&app, post_event(serde_json::json!({"person": "alice", "timestamp": "2024-01-01 09:00:00"}))).await;
        let before = service.store().list_all().unwrap();

        let (status, body) =
            call(&app, post_event(serde_json::json!({"person": "alice", "timestamp": "2024-01-01 9am"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("malformed event timestamp"));
        assert_eq!(service.store().list_all().unwrap(), before);
    }

    #[tokio::test]
    async fn test_missing_person_is_400() {
        let (app, service) = app();
        let (status, _) = call(&app, post_event(serde_json::json!({"timestamp": "2024-01-01 09:00:00"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(service.store().list_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_json_body_is_client_error() {
        let (app, _) = app();
        let request = Request::post("/events")
            .header("content-type", "application/json")
            .body(Body::from("not json"))
            .unwrap();
        let (status, _) = call(&app, request).await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_attendance_ranked_day_desc_person_asc() {
        let (app, _) = app();
        for (person, ts) in [
            ("carol", "2024-01-01 09:00:00"),
            ("bob", "2024-01-02 09:00:00"),
            ("alice", "2024-01-01 09:00:00"),
            ("alice", "2024-01-01 17:00:00"),
        ] {
            call(&app, post_event(serde_json::json!({"person": person, "timestamp": ts}))).await;
        }

        let (status, body) = call(&app, get("/attendance")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!([
                {"rank": 1, "person": "Bob", "day": "2024-01-02", "session": "09:00:00 - 09:00:00", "total_hours": "0:00:00"},
                {"rank": 2, "person": "Alice", "day": "2024-01-01", "session": "09:00:00 - 17:00:00", "total_hours": "8:00:00"},
                {"rank": 3, "person": "Carol", "day": "2024-01-01", "session": "09:00:00 - 09:00:00", "total_hours": "0:00:00"},
            ])
        );
    }

    #[tokio::test]
    async fn test_attendance_for_day() {
        let (app, _) = app();
        call(&app, post_event(serde_json::json!({"person": "bob", "timestamp": "2024-01-02 09:00:00"}))).await;
        call(&app, post_event(serde_json::json!({"person": "alice", "timestamp": "2024-01-01 09:00:00"}))).await;

        let (status, body) = call(&app, get("/attendance/2024-01-01")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["person"], "Alice");
        assert_eq!(body[0]["rank"], 1);

        let (status, _) = call(&app, get("/attendance/yesterday")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status() {
        let (app, _) = app();
        call(&app, post_event(serde_json::json!({"person": "bob", "timestamp": "2024-01-02 09:00:00"}))).await;

        let (status, body) = call(&app, get("/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mirror"], "disabled");
        assert_eq!(body["records"], 1);
    }
}
