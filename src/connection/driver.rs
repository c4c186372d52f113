//! Store Driver Abstraction

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::error::DriverError;
use super::types::{ConnectOptions, LifecycleEvent, ReadyState};

/// Capacity of a driver's lifecycle event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The backing-store client the connection manager drives.
///
/// A driver owns the real handle and reports its transitions through
/// [`StoreDriver::subscribe`]. Everything except `connect` and `close` must be
/// cheap and non-blocking, since status queries call it directly.
#[async_trait]
pub trait StoreDriver: Send + Sync + 'static {
    /// Subscribe to lifecycle notifications
    fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent>;

    /// Reject targets this driver can never connect to
    fn validate_target(&self, _uri: &str) -> Result<(), DriverError> {
        Ok(())
    }

    /// Establish the connection and confirm the store is reachable
    async fn connect(&self, uri: &str, options: &ConnectOptions) -> Result<(), DriverError>;

    /// Close the handle
    async fn close(&self) -> Result<(), DriverError>;

    fn ready_state(&self) -> ReadyState;

    fn host(&self) -> Option<String>;

    fn name(&self) -> Option<String>;
}
