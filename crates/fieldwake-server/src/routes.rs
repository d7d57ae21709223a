//! HTTP surface for devices and operators.
//!
//! Handlers validate input up front and hand off to the core components;
//! nothing here owns state of its own.

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::debug;

use fieldwake_core::error::{PersistenceError, RendezvousError, ValidationError};
use fieldwake_core::report::unix_timestamp;
use fieldwake_core::{Command, DeviceKey, DeviceReport, ReportBody, ReportRecord, TriggerOutcome};

pub use crate::state::AppState;

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/about", get(about))
        .route("/healthz", get(healthz))
        .route("/wait", get(wait))
        .route("/trigger", post(trigger))
        .route("/log", post(report))
        .route("/report", post(report))
        .route("/status", post(update_status))
        .route("/status/latest", get(latest_status))
        .route("/data.json", get(data_json))
        .route("/data/clear", get(clear_data))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Errors surfaced to HTTP callers as `{"ok": false, "error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Busy(RendezvousError),
    Persistence(PersistenceError),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<RendezvousError> for ApiError {
    fn from(e: RendezvousError) -> Self {
        Self::Busy(e)
    }
}

impl From<PersistenceError> for ApiError {
    fn from(e: PersistenceError) -> Self {
        Self::Persistence(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Validation(e) => {
                debug!(error = %e, "Rejected request");
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            Self::Busy(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            Self::Persistence(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(json!({ "ok": false, "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct DeviceQuery {
    device_key: Option<String>,
}

/// Query extraction that leaves rejection handling to the handler, so a
/// malformed query string gets the same treatment as a bad key.
type MaybeDeviceQuery = Result<Query<DeviceQuery>, QueryRejection>;

fn device_key_from(query: MaybeDeviceQuery) -> Result<DeviceKey, ValidationError> {
    let Query(query) = query.map_err(|e| ValidationError::MalformedQuery(e.body_text()))?;
    query.device_key()
}

impl DeviceQuery {
    fn device_key(&self) -> Result<DeviceKey, ValidationError> {
        let raw = self
            .device_key
            .as_deref()
            .ok_or(ValidationError::MissingField("device_key"))?;
        Ok(DeviceKey::parse(raw)?)
    }
}

#[derive(Debug, Serialize)]
pub struct WaitResponse {
    pub cmd: Command,
}

/// Parse and validate a report body regardless of its content type; devices
/// are not reliable about setting one.
fn parse_report(body: &Bytes) -> Result<DeviceReport, ValidationError> {
    let raw: ReportBody = serde_json::from_slice(body)
        .map_err(|e| ValidationError::MalformedBody(e.to_string()))?;
    DeviceReport::from_body(raw, unix_timestamp())
}

/// `GET /`
pub async fn root() -> &'static str {
    "fieldwake: device command rendezvous server\n"
}

/// `GET /about`
pub async fn about() -> Json<Value> {
    Json(json!({
        "message": "Fieldwake bridges long-polling field devices and operator triggers.",
        "status": "success",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "ok"
}

/// `GET /wait?device_key=K`: long-poll until triggered or timed out.
pub async fn wait(
    State(state): State<AppState>,
    query: MaybeDeviceQuery,
) -> Result<Json<WaitResponse>, ApiError> {
    let key = device_key_from(query)?;
    let cmd = state.rendezvous.wait(key).await?;
    Ok(Json(WaitResponse { cmd }))
}

/// `POST /trigger?device_key=K`
pub async fn trigger(
    State(state): State<AppState>,
    query: MaybeDeviceQuery,
) -> Result<String, ApiError> {
    let key = device_key_from(query)?;
    let message = match state.rendezvous.trigger(&key) {
        TriggerOutcome::Sent => format!("sent: command delivered to {key}"),
        TriggerOutcome::NotFound => format!("not_found: no waiter for {key}"),
    };
    Ok(message)
}

/// `POST /log`, `POST /report`: persist a report and refresh the cache.
pub async fn report(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let report = parse_report(&body)?;
    state.status_cache.put(report.clone());
    let (record, total) = state.event_log.record(report).await?;
    Ok(Json(json!({ "ok": true, "record": record, "total": total })))
}

/// `POST /status`: cache only, nothing durable.
pub async fn update_status(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let report = parse_report(&body)?;
    let entry = state.status_cache.put(report);
    Ok(Json(json!({ "ok": true, "data": entry })))
}

/// `GET /status/latest?device_key=K`
pub async fn latest_status(State(state): State<AppState>, query: MaybeDeviceQuery) -> Json<Value> {
    let entry = device_key_from(query)
        .ok()
        .and_then(|key| state.status_cache.get(&key));
    match entry {
        Some(entry) => Json(json!({ "ok": true, "data": entry })),
        None => Json(json!({ "ok": false })),
    }
}

/// `GET /data.json`
pub async fn data_json(State(state): State<AppState>) -> Json<Vec<ReportRecord>> {
    Json(state.event_log.read_all().await)
}

/// `GET /data/clear`
pub async fn clear_data(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.event_log.clear().await?;
    Ok(Json(json!({ "ok": true })))
}
