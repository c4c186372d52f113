//! Connection Types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle state of the connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Initial state, and the state reached after giving up on retries
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// The store answered the last connect attempt
    Connected,
    /// Waiting out the retry interval before the next attempt
    Reconnecting,
    /// Terminal state after shutdown
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Low-level phase of the driver handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    Disconnected = 0,
    Connected = 1,
    Connecting = 2,
    Disconnecting = 3,
}

impl ReadyState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ReadyState::Connected,
            2 => ReadyState::Connecting,
            3 => ReadyState::Disconnecting,
            _ => ReadyState::Disconnected,
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadyState::Disconnected => "disconnected",
            ReadyState::Connected => "connected",
            ReadyState::Connecting => "connecting",
            ReadyState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Notifications emitted by a store driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connecting,
    Connected,
    Error { message: String },
    Disconnected,
    Closed,
}

/// Preferred network family when resolving the store host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    Ipv4,
    Ipv6,
    Any,
}

/// Whether a disconnect after giving up starts a fresh retry cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RearmPolicy {
    /// Stay disconnected until `connect()` is called again
    #[default]
    Never,
    /// Reset the retry counter and reconnect on the next disconnect event
    OnDisconnect,
}

/// Fixed options handed to the driver on every connect attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub app_name: String,
    pub database_name: Option<String>,
    pub max_pool_size: u32,
    pub server_selection_timeout: Duration,
    pub socket_timeout: Duration,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub address_family: AddressFamily,
    pub debug: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            app_name: "coursehub".to_string(),
            database_name: None,
            max_pool_size: 10,
            server_selection_timeout: Duration::from_secs(5),
            socket_timeout: Duration::from_secs(45),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(10),
            address_family: AddressFamily::Ipv4,
            debug: false,
        }
    }
}

/// Settings that drive the connection manager
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub uri: Option<String>,
    pub options: ConnectOptions,
    pub max_retries: u32,
    pub retry_interval: Duration,
    pub close_timeout: Duration,
    pub rearm: RearmPolicy,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            uri: None,
            options: ConnectOptions::default(),
            max_retries: 3,
            retry_interval: Duration::from_secs(5),
            close_timeout: Duration::from_secs(10),
            rearm: RearmPolicy::Never,
        }
    }
}

/// Read-only snapshot returned by `ConnectionManager::get_status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub ready_state: ReadyState,
    pub host: Option<String>,
    pub name: Option<String>,
    pub state: ConnectionState,
    pub retry_count: u32,
    pub retries_exhausted: bool,
}

/// State owned by the lifecycle task and published on every change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Snapshot {
    pub connected: bool,
    pub state: ConnectionState,
    pub retry_count: u32,
    pub retries_exhausted: bool,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            connected: false,
            state: ConnectionState::Disconnected,
            retry_count: 0,
            retries_exhausted: false,
        }
    }
}
