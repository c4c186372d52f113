//! Status API Module
//!
//! HTTP health, connection status and metrics endpoints for monitoring.

pub mod api;
pub mod handlers;
pub mod server;
pub mod types;

pub use api::StatusApi;
pub use handlers::AppState;
pub use server::StatusServer;
pub use types::*;
