//! Hydro Assistant - hydroponic station control API server

use automation_engine::{load_config, AutomationEngine, AutomationError, Collaborators};
use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use hydro_core::persistence::{JsonDirectory, JsonLinesStore};
use hydro_core::simulation::{LatestReadings, SimulatedGateway};
use hydro_core::{ActionLogFilter, ActuatorId, DeviceId, Metric, SensorSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod alerts;
mod websocket;

use alerts::BroadcastAlertSink;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AutomationEngine>,
    pub readings: Arc<LatestReadings>,
    pub alerts: Arc<BroadcastAlertSink>,
    pub history: Arc<JsonLinesStore>,
}

/// API response wrapper using serde_json::Value for flexibility
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or(serde_json::Value::Null)),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Map an engine error to a status code and error envelope
fn error_response(err: &AutomationError) -> (StatusCode, Json<ApiResponse>) {
    let status = match err {
        AutomationError::DeviceNotFound(_) | AutomationError::ActuatorNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        AutomationError::DispatchFailed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::error(err.to_string())))
}

/// Sensor readings pushed by a station
///
/// Metric keys accept the aliases `Metric` parses (e.g. `temp`, `lux`, `tds`).
#[derive(Debug, Deserialize)]
struct ReadingsRequest {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    values: BTreeMap<String, f64>,
}

impl ReadingsRequest {
    fn into_snapshot(self, device_id: DeviceId) -> Result<SensorSnapshot, String> {
        let mut snapshot = SensorSnapshot::new(device_id);
        if let Some(timestamp) = self.timestamp {
            snapshot.timestamp = timestamp;
        }
        for (key, value) in self.values {
            let metric: Metric = key
                .parse()
                .map_err(|_| format!("Unknown sensor metric: {key}"))?;
            if !value.is_finite() {
                return Err(format!("Reading for {key} is not a finite number"));
            }
            snapshot.set(metric, Some(value));
        }
        Ok(snapshot)
    }
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Get the automation status of a device
async fn device_status(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
) -> impl IntoResponse {
    match state.engine.get_status(device_id).await {
        Ok(status) => (StatusCode::OK, Json(ApiResponse::success(status))),
        Err(e) => error_response(&e),
    }
}

/// Push a sensor snapshot for a device
async fn push_readings(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    Json(req): Json<ReadingsRequest>,
) -> impl IntoResponse {
    let snapshot = match req.into_snapshot(device_id) {
        Ok(snapshot) => snapshot,
        Err(msg) => return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(msg))),
    };

    let timestamp = snapshot.timestamp;
    let accepted = state.readings.record(snapshot);
    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "device_id": device_id,
            "timestamp": timestamp,
            "accepted": accepted
        }))),
    )
}

/// Turn every actuator of a device off
async fn emergency_stop(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
) -> impl IntoResponse {
    match state.engine.emergency_stop(device_id).await {
        Ok(report) => (StatusCode::OK, Json(ApiResponse::success(report))),
        Err(e) => error_response(&e),
    }
}

async fn set_actuator(state: AppState, actuator_id: ActuatorId, on: bool) -> impl IntoResponse {
    match state.engine.override_actuator(actuator_id, on).await {
        Ok(entry) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "actuator_id": actuator_id,
                "state": entry.state,
                "source": entry.source,
                "updated_at": entry.updated_at
            }))),
        ),
        Err(e) => error_response(&e),
    }
}

/// Turn actuator on
async fn actuator_on(
    State(state): State<AppState>,
    Path(actuator_id): Path<ActuatorId>,
) -> impl IntoResponse {
    set_actuator(state, actuator_id, true).await
}

/// Turn actuator off
async fn actuator_off(
    State(state): State<AppState>,
    Path(actuator_id): Path<ActuatorId>,
) -> impl IntoResponse {
    set_actuator(state, actuator_id, false).await
}

async fn query_action_logs(
    state: &AppState,
    filter: &ActionLogFilter,
) -> (StatusCode, Json<ApiResponse>) {
    match state.history.action_logs(filter).await {
        Ok(entries) => (StatusCode::OK, Json(ApiResponse::success(entries))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

/// List action log entries, filtered by actuator, device and time range
async fn list_action_logs(
    State(state): State<AppState>,
    Query(filter): Query<ActionLogFilter>,
) -> impl IntoResponse {
    query_action_logs(&state, &filter).await
}

/// Action log of one actuator
async fn actuator_logs(
    State(state): State<AppState>,
    Path(actuator_id): Path<ActuatorId>,
    Query(mut filter): Query<ActionLogFilter>,
) -> impl IntoResponse {
    filter.actuator_id = Some(actuator_id);
    query_action_logs(&state, &filter).await
}

fn scheduler_info(state: &AppState) -> serde_json::Value {
    serde_json::json!({
        "running": state.engine.is_scheduler_running(),
        "tick_interval_secs": state.engine.config().tick_interval_secs,
        "manual_hold_secs": state.engine.config().manual_hold_secs
    })
}

/// Get scheduler status
async fn scheduler_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(scheduler_info(&state)))
}

/// Start the scheduler
async fn scheduler_start(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.start_scheduler();
    Json(ApiResponse::success(scheduler_info(&state)))
}

/// Stop the scheduler
async fn scheduler_stop(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.stop_scheduler().await;
    Json(ApiResponse::success(scheduler_info(&state)))
}

/// Restart the scheduler
async fn scheduler_restart(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.restart_scheduler().await;
    Json(ApiResponse::success(scheduler_info(&state)))
}

/// Tick every active device now
async fn scheduler_run(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.run_once().await;
    Json(ApiResponse::success(scheduler_info(&state)))
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_socket(socket, state))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/devices/:id/status", get(device_status))
        .route("/api/v1/devices/:id/readings", post(push_readings))
        .route("/api/v1/devices/:id/emergency-stop", post(emergency_stop))
        .route("/api/v1/actuators/:id/on", post(actuator_on))
        .route("/api/v1/actuators/:id/off", post(actuator_off))
        .route("/api/v1/actuators/:id/logs", get(actuator_logs))
        .route("/api/v1/action-logs", get(list_action_logs))
        .route("/api/v1/scheduler", get(scheduler_status))
        .route("/api/v1/scheduler/start", post(scheduler_start))
        .route("/api/v1/scheduler/stop", post(scheduler_stop))
        .route("/api/v1/scheduler/restart", post(scheduler_restart))
        .route("/api/v1/scheduler/run", post(scheduler_run))
        // WebSocket
        .route("/ws", get(ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "hydro_assistant_api=debug,automation_engine=debug,hydro_core=info,info".into()
        }))
        .init();

    tracing::info!("Starting Hydro Assistant API server");

    let data_dir =
        PathBuf::from(std::env::var("HYDRO_DATA_DIR").unwrap_or_else(|_| "./data".to_string()));
    let listen = std::env::var("HYDRO_LISTEN").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    tokio::fs::create_dir_all(&data_dir).await?;

    let config = load_config(&data_dir.join("config.json")).await?;
    tracing::info!(
        "Tick interval {}s, manual hold {}s",
        config.tick_interval_secs,
        config.manual_hold_secs
    );

    let readings = Arc::new(LatestReadings::new());
    let alerts = Arc::new(BroadcastAlertSink::new(64));
    let history = Arc::new(JsonLinesStore::new(&data_dir));
    let engine = Arc::new(AutomationEngine::new(
        config,
        Collaborators {
            sensors: readings.clone(),
            directory: Arc::new(JsonDirectory::new(data_dir.join("devices.json"))),
            store: history.clone(),
            gateway: Arc::new(SimulatedGateway::new()),
            alerts: alerts.clone(),
        },
    )?);
    engine.start();

    let state = AppState {
        engine: Arc::clone(&engine),
        readings,
        alerts,
        history,
    };

    tracing::info!("Listening on http://{}", listen);
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.stop_scheduler().await;
    tracing::info!("Hydro Assistant stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: serde_json::Value) -> ReadingsRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_readings_accept_aliases() {
        let snapshot = request(serde_json::json!({
            "temp": 24.5,
            "moisture": 31.0,
            "tds": 900.0
        }))
        .into_snapshot(3)
        .unwrap();

        assert_eq!(snapshot.device_id, 3);
        assert_eq!(snapshot.get(Metric::Temperature), Some(24.5));
        assert_eq!(snapshot.get(Metric::Moisture), Some(31.0));
        assert_eq!(snapshot.get(Metric::Ppm), Some(900.0));
        assert_eq!(snapshot.get(Metric::Light), None);
    }

    #[test]
    fn test_readings_keep_supplied_timestamp() {
        let snapshot = request(serde_json::json!({
            "timestamp": "2024-05-01T12:00:00Z",
            "light": 450.0
        }))
        .into_snapshot(1)
        .unwrap();

        assert_eq!(snapshot.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_readings_reject_unknown_metric() {
        let err = request(serde_json::json!({ "co2": 400.0 }))
            .into_snapshot(1)
            .unwrap_err();
        assert!(err.contains("co2"));
    }

    #[test]
    fn test_error_status_codes() {
        let (status, _) = error_response(&AutomationError::ActuatorNotFound(4));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = error_response(&AutomationError::DispatchFailed {
            actuator_id: 4,
            reason: "offline".to_string(),
        });
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, body) = error_response(&AutomationError::DeviceNotFound(999));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.0.success);
    }

    #[test]
    fn test_action_log_filter_from_query() {
        let uri: axum::http::Uri =
            "/api/v1/action-logs?device_id=2&start_time=2024-05-01T00:00:00Z"
                .parse()
                .unwrap();
        let Query(filter) = Query::<ActionLogFilter>::try_from_uri(&uri).unwrap();

        assert_eq!(filter.device_id, Some(2));
        assert_eq!(filter.actuator_id, None);
        assert!(filter.start_time.is_some());
        assert!(filter.end_time.is_none());
    }
}
