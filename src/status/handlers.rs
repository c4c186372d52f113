//! Status API Handlers

use super::types::*;
use crate::connection::{ConnectionManager, ConnectionState, ConnectionStatus};
use crate::metrics::Metrics;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub connection: ConnectionManager,
    pub metrics: Arc<Metrics>,
    pub start_time: SystemTime,
}

/// Health check handler.
///
/// Reports `degraded` with 503 while the store is unreachable so load
/// balancers stop routing traffic here.
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<HealthStatus>>) {
    let db = state.connection.get_status();
    let mut checks = HashMap::new();

    let (db_status, db_message) = if db.connected {
        ("healthy", format!("Connected to {}", db.host.as_deref().unwrap_or("store")))
    } else if db.retries_exhausted {
        ("unhealthy", format!("Gave up after {} retries", db.retry_count))
    } else {
        ("unhealthy", format!("Connection is {}", db.state))
    };

    checks.insert(
        "database".to_string(),
        CheckResult {
            status: db_status.to_string(),
            message: Some(db_message),
        },
    );

    let overall_status = if checks.values().all(|c| c.status == "healthy") {
        "healthy"
    } else {
        "degraded"
    };

    let code = if overall_status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let health = HealthStatus {
        status: overall_status.to_string(),
        uptime_seconds: SystemTime::now()
            .duration_since(state.start_time)
            .unwrap_or_default()
            .as_secs(),
        checks,
        timestamp: SystemTime::now(),
    };

    (code, Json(ApiResponse::success(health)))
}

/// Current store connection status
pub async fn get_db_status(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<ConnectionStatus>>) {
    let status = state.connection.get_status();
    if status.state == ConnectionState::Closed {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error("Connection manager is shut down".to_string())),
        );
    }
    (StatusCode::OK, Json(ApiResponse::success(status)))
}

/// Prometheus scrape endpoint
pub async fn export_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.export_prometheus(),
    )
}

/// Fallback for unknown routes
pub async fn not_found() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            status: "error".to_string(),
            message: "Route not found".to_string(),
        }),
    )
}
