//! Status API Routes

use super::handlers::*;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

/// Status API router
pub struct StatusApi;

impl StatusApi {
    /// Create the status API router
    pub fn create_router(state: AppState) -> Router {
        let api_routes = Router::new()
            .route("/health", get(health_check))
            .route("/status/db", get(get_db_status));

        Router::new()
            .nest("/api/v1", api_routes)
            .route("/metrics", get(export_metrics))
            .fallback(not_found)
            .layer(CorsLayer::permissive())
            .with_state(state)
    }
}
