//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::connection::{AddressFamily, ConnectOptions, ConnectionSettings, RearmPolicy};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub retry: RetryConfig,
    pub status_server: StatusServerConfig,
    pub logging: LoggingConfig,
}

/// Store connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub uri: Option<String>,
    pub name: Option<String>,
    pub app_name: String,
    pub max_pool_size: u32,
    #[serde(with = "humantime_serde")]
    pub server_selection_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub socket_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub close_timeout: Duration,
    pub address_family: AddressFamily,
    pub debug: bool,
}

/// Reconnection policy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub rearm: RearmPolicy,
}

/// Health/status HTTP endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusServerConfig {
    pub enabled: bool,
    pub bind_addr: SocketAddr,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            retry: RetryConfig::default(),
            status_server: StatusServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: None,
            name: None,
            app_name: "coursehub".to_string(),
            max_pool_size: 10,
            server_selection_timeout: Duration::from_secs(5),
            socket_timeout: Duration::from_secs(45),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(10),
            close_timeout: Duration::from_secs(10),
            address_family: AddressFamily::Ipv4,
            debug: false,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            interval: Duration::from_secs(5),
            rearm: RearmPolicy::Never,
        }
    }
}

impl Default for StatusServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Settings for the connection manager
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            uri: self.database.uri.clone(),
            options: ConnectOptions {
                app_name: self.database.app_name.clone(),
                database_name: self.database.name.clone(),
                max_pool_size: self.database.max_pool_size,
                server_selection_timeout: self.database.server_selection_timeout,
                socket_timeout: self.database.socket_timeout,
                connect_timeout: self.database.connect_timeout,
                heartbeat_interval: self.database.heartbeat_interval,
                address_family: self.database.address_family,
                debug: self.database.debug,
            },
            max_retries: self.retry.max_retries,
            retry_interval: self.retry.interval,
            close_timeout: self.database.close_timeout,
            rearm: self.retry.rearm,
        }
    }

    /// Connection target with any credentials masked, for logging
    pub fn redacted_uri(&self) -> Option<String> {
        self.database.uri.as_deref().map(redact_uri)
    }
}

fn redact_uri(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_string();
    };
    match rest.rsplit_once('@') {
        Some((_, host)) => format!("{}://****@{}", scheme, host),
        None => uri.to_string(),
    }
}
