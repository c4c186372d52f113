//! Status API Server

use super::{api::StatusApi, handlers::AppState};
use crate::{connection::ConnectionManager, Result};
use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::time::SystemTime;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info};

/// Status API server
pub struct StatusServer {
    bind_addr: SocketAddr,
    app_state: AppState,
}

impl StatusServer {
    /// Create a new status server reporting on `connection` and its metrics
    pub fn new(bind_addr: SocketAddr, connection: ConnectionManager) -> Self {
        let app_state = AppState {
            metrics: connection.metrics(),
            connection,
            start_time: SystemTime::now(),
        };

        Self {
            bind_addr,
            app_state,
        }
    }

    /// Serve until a shutdown signal arrives
    pub async fn start(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let app = StatusApi::create_router(self.app_state);

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind status server to {}", self.bind_addr))?;

        info!("Status server listening on {}", self.bind_addr);

        let graceful = async move {
            let _ = shutdown_rx.recv().await;
            info!("Status server stopping");
        };

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(graceful)
            .await
        {
            error!("Status server error: {}", e);
            return Err(e.into());
        }

        Ok(())
    }

    /// Create a router for testing
    pub fn create_test_router(&self) -> Router {
        StatusApi::create_router(self.app_state.clone())
    }
}
