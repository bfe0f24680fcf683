use crate::collectors::snapshot;
use crate::config::{CollectConfig, PowerConfig};
use crate::metrics::Metrics;
use crate::power::{self, PowerAction, PowerError};
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub collect: Arc<CollectConfig>,
    pub power: Arc<PowerConfig>,
    pub shutdown_password: Arc<str>,
}

/// Body shape shared by both power endpoints.
#[derive(Debug, Serialize)]
struct ActionResponse {
    status: &'static str,
    message: String,
}

impl ActionResponse {
    fn success(message: &str) -> Self {
        Self {
            status: "success",
            message: message.to_string(),
        }
    }

    fn error(message: String) -> Self {
        Self {
            status: "error",
            message,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ShutdownRequest {
    #[serde(default)]
    password: String,
}

impl IntoResponse for PowerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            PowerError::Unauthorized => (StatusCode::UNAUTHORIZED, "Invalid password".to_string()),
            PowerError::Spawn { .. } => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        (status, Json(ActionResponse::error(message))).into_response()
    }
}

const INDEX_HTML: &str = include_str!("../static/index.html");
const DASHBOARD_JS: &str = include_str!("../static/dashboard.js");

pub fn build_router(state: HttpAppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/dashboard.js", get(dashboard_js))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/metrics/all", get(all_handler))
        .route("/api/metrics/cpu", get(cpu_handler))
        .route("/api/metrics/memory", get(memory_handler))
        .route("/api/metrics/storage", get(storage_handler))
        .route("/api/metrics/system", get(system_handler))
        .route("/api/metrics/smart", get(smart_handler))
        .route("/api/system/reboot", post(reboot_handler))
        .route("/api/system/shutdown", post(shutdown_handler))
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    ([(CONTENT_TYPE, "text/html; charset=utf-8")], INDEX_HTML)
}

async fn dashboard_js() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "application/javascript; charset=utf-8")],
        DASHBOARD_JS,
    )
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    let snap = snapshot::all_metrics(&state.collect).await;
    state.metrics.update_from_snapshot(&snap);
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

async fn all_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    state.metrics.inc_api_request("all");
    Json(snapshot::all_metrics(&state.collect).await)
}

async fn cpu_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    state.metrics.inc_api_request("cpu");
    Json(snapshot::cpu_metrics(&state.collect).await)
}

async fn memory_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    state.metrics.inc_api_request("memory");
    Json(snapshot::memory_metrics(&state.collect).await)
}

async fn storage_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    state.metrics.inc_api_request("storage");
    Json(snapshot::storage_metrics(&state.collect).await)
}

async fn system_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    state.metrics.inc_api_request("system");
    Json(snapshot::system_info(&state.collect).await)
}

async fn smart_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    state.metrics.inc_api_request("smart");
    Json(snapshot::smart_data(&state.collect).await)
}

async fn reboot_handler(State(state): State<HttpAppState>) -> Response {
    let result = power::reboot(&state.power);
    record_power_action(&state, PowerAction::Reboot, &result);
    match result {
        Ok(()) => Json(ActionResponse::success("System rebooting...")).into_response(),
        Err(err) => err.into_response(),
    }
}

/// A missing or malformed body is treated as an empty password.
async fn shutdown_handler(State(state): State<HttpAppState>, body: Bytes) -> Response {
    let request: ShutdownRequest = serde_json::from_slice(&body).unwrap_or_default();
    let result = power::shutdown(&state.power, &state.shutdown_password, &request.password);
    record_power_action(&state, PowerAction::Shutdown, &result);
    match result {
        Ok(()) => Json(ActionResponse::success("System shutting down...")).into_response(),
        Err(err) => err.into_response(),
    }
}

fn record_power_action(state: &HttpAppState, action: PowerAction, result: &Result<(), PowerError>) {
    let outcome = match result {
        Ok(()) => "issued",
        Err(PowerError::Unauthorized) => "unauthorized",
        Err(PowerError::Spawn { .. }) => "failed",
    };
    state.metrics.inc_power_action(action.as_str(), outcome);
}
