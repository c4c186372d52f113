//! coursehub
//!
//! Backend service for the course platform. This crate owns the lifecycle of
//! the single MongoDB connection the service runs on: connecting, retrying,
//! reacting to drops, reporting status and closing cleanly on shutdown.

pub mod config;
pub mod connection;
pub mod metrics;
pub mod shutdown;
pub mod status;

pub use config::Config;
pub use connection::ConnectionManager;
pub use shutdown::ShutdownCoordinator;

/// Common error type for the service
pub type Result<T> = anyhow::Result<T>;
