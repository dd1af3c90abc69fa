//! API route handlers.
//!
//! Read-only views over the export root and the status ledger, plus an
//! out-of-band trigger. Missing files are empty lists, never errors.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::ledger::{LedgerRecord, RunStatusLedger};
use crate::scheduler::ManualTrigger;
use crate::storage::export::Row;
use crate::storage::ExportStore;

/// Application state shared across handlers.
pub struct AppState {
    pub store: Arc<ExportStore>,
    pub ledger: Arc<RunStatusLedger>,
    pub trigger: Arc<dyn ManualTrigger>,
    pub tz: Tz,
}

impl AppState {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }
}

/// Error type for API handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.status.to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// `?date=YYYY-MM-DD&time=HH-MM`, both optional
#[derive(Debug, Default, Deserialize)]
pub struct DayQuery {
    pub date: Option<String>,
    pub time: Option<String>,
}

impl DayQuery {
    fn date(&self, state: &AppState) -> Result<NaiveDate, ApiError> {
        match &self.date {
            None => Ok(state.today()),
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| ApiError::bad_request(format!("Invalid date {:?}, expected YYYY-MM-DD", raw))),
        }
    }
}

/// Build the router with tracing and permissive CORS.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/schedule", get(schedule))
        .route("/api/snapshots", get(snapshots))
        .route("/api/details", get(details))
        .route("/api/details/merged", get(details_merged))
        .route("/api/results", get(results))
        .route("/api/status", get(status))
        .route("/api/trigger", post(trigger))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn schedule(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let date = query.date(&state)?;
    read_rows(&state, &state.store.schedule_path(date)).map(Json)
}

/// Snapshot stems for the day, oldest first.
pub async fn snapshots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let date = query.date(&state)?;
    list_snapshots(&state, date).map(Json)
}

/// One snapshot: the one at `time`, or the latest.
pub async fn details(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let date = query.date(&state)?;
    let stems = list_snapshots(&state, date)?;

    let stem = match &query.time {
        Some(time) => {
            if !is_snapshot_time(time) {
                return Err(ApiError::bad_request(format!("Invalid time {:?}, expected HH-MM", time)));
            }
            let wanted = format!("details-{}", time);
            stems.into_iter().find(|s| *s == wanted)
        }
        None => stems.into_iter().last(),
    };

    match stem {
        Some(stem) => read_rows(&state, &state.store.snapshot_path(date, &stem)).map(Json),
        None => Ok(Json(Vec::new())),
    }
}

/// Every snapshot of the day, each row tagged with `snapshotTime`.
pub async fn details_merged(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let date = query.date(&state)?;

    let mut merged = Vec::new();
    for stem in list_snapshots(&state, date)? {
        let time = stem.trim_start_matches("details-").to_string();
        for mut row in read_rows(&state, &state.store.snapshot_path(date, &stem))? {
            row.insert("snapshotTime".to_string(), Value::String(time.clone()));
            merged.push(row);
        }
    }
    Ok(Json(merged))
}

pub async fn results(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let date = query.date(&state)?;
    read_rows(&state, &state.store.results_path(date)).map(Json)
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<LedgerRecord> {
    Json(state.ledger.snapshot().await)
}

/// Run all three jobs now and report each outcome by job name.
pub async fn trigger(State(state): State<Arc<AppState>>) -> Json<Map<String, Value>> {
    let outcomes = state.trigger.trigger_all().await;
    let body = outcomes
        .into_iter()
        .map(|(kind, outcome)| {
            let value = serde_json::to_value(&outcome).unwrap_or(Value::Null);
            (kind.name().to_string(), value)
        })
        .collect();
    Json(body)
}

fn read_rows(state: &AppState, path: &std::path::Path) -> Result<Vec<Row>, ApiError> {
    state
        .store
        .read_rows(path)
        .map_err(|e| ApiError::internal(e.to_string()))
}

fn list_snapshots(state: &AppState, date: NaiveDate) -> Result<Vec<String>, ApiError> {
    state
        .store
        .list_snapshots(date)
        .map_err(|e| ApiError::internal(e.to_string()))
}

/// `HH-MM`, optionally with a `-N` collision suffix
fn is_snapshot_time(time: &str) -> bool {
    let mut parts = time.split('-');
    let two_digits = |p: Option<&str>| p.is_some_and(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_digit()));
    let hour_minute = two_digits(parts.next()) && two_digits(parts.next());
    let suffix_ok = match parts.next() {
        None => true,
        Some(n) => !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()),
    };
    hour_minute && suffix_ok && parts.next().is_none()
}
