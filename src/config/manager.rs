//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::path::Path;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file, then apply environment overrides
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let mut config = if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            Config::default()
        };

        config.apply_env(&|key: &str| std::env::var(key).ok())?;
        config.validate()
            .with_context(|| "Configuration validation failed")?;

        tracing::info!("Configuration loaded and validated successfully");
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();
        config.apply_env(&|key: &str| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Apply environment overrides. Values in the environment win over the file.
    ///
    /// `lookup` is injected so tests don't have to touch the process environment.
    pub fn apply_env(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(uri) = lookup("MONGO_URI") {
            self.database.uri = Some(uri);
        }

        if let Some(name) = lookup("MONGO_DB_NAME") {
            self.database.name = Some(name);
        }

        if let Some(debug) = lookup("MONGO_DEBUG") {
            match parse_flag(&debug) {
                Some(enabled) => self.database.debug = enabled,
                None => {
                    let value = &debug;
                    tracing::warn!("Ignoring unrecognized MONGO_DEBUG value: {}", value)
                }
            }
        }

        if lookup("COURSEHUB_ENV").as_deref() == Some("development") {
            self.database.debug = true;
        }

        if let Some(max_retries) = lookup("COURSEHUB_MAX_RETRIES") {
            self.retry.max_retries = max_retries.parse::<u32>()
                .with_context(|| format!("Invalid COURSEHUB_MAX_RETRIES: {}", max_retries))?;
        }

        if let Some(interval) = lookup("COURSEHUB_RETRY_INTERVAL") {
            self.retry.interval = humantime::parse_duration(&interval)
                .with_context(|| format!("Invalid COURSEHUB_RETRY_INTERVAL: {}", interval))?;
        }

        if let Some(port) = lookup("PORT") {
            let port = port.parse::<u16>()
                .with_context(|| format!("Invalid PORT: {}", port))?;
            self.status_server.bind_addr.set_port(port);
        }

        if let Some(log_level) = lookup("COURSEHUB_LOG_LEVEL") {
            self.logging.level = log_level;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_database_config()
            .with_context(|| "Database configuration validation failed")?;

        self.validate_retry_config()
            .with_context(|| "Retry configuration validation failed")?;

        self.validate_logging_config()
            .with_context(|| "Logging configuration validation failed")?;

        Ok(())
    }

    /// Validate database configuration.
    ///
    /// A missing URI is allowed here; `connect()` reports it.
    fn validate_database_config(&self) -> Result<()> {
        if let Some(uri) = &self.database.uri {
            if !uri.trim().is_empty()
                && !(uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://"))
            {
                bail!("database.uri must start with mongodb:// or mongodb+srv://");
            }
        }

        if self.database.max_pool_size == 0 {
            bail!("max_pool_size must be greater than 0");
        }

        if self.database.max_pool_size > 1000 {
            bail!("max_pool_size cannot exceed 1000");
        }

        if self.database.server_selection_timeout.is_zero() {
            bail!("server_selection_timeout must be greater than 0");
        }

        if self.database.socket_timeout.is_zero() {
            bail!("socket_timeout must be greater than 0");
        }

        if self.database.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }

        if self.database.heartbeat_interval < std::time::Duration::from_millis(500) {
            bail!("heartbeat_interval must be at least 500ms");
        }

        if self.database.close_timeout.is_zero() {
            bail!("close_timeout must be greater than 0");
        }

        Ok(())
    }

    /// Validate retry configuration
    fn validate_retry_config(&self) -> Result<()> {
        if self.retry.max_retries > 100 {
            bail!("max_retries cannot exceed 100");
        }

        if self.retry.interval.is_zero() {
            bail!("retry interval must be greater than 0");
        }

        Ok(())
    }

    /// Validate logging configuration
    fn validate_logging_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            bail!("logging.level must be one of: {}", valid_log_levels.join(", "));
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        mongo_uri: Option<&str>,
        port: Option<u16>,
        max_retries: Option<u32>,
        retry_interval: Option<&str>,
        no_status_server: bool,
    ) {
        if let Some(uri) = mongo_uri {
            self.database.uri = Some(uri.to_string());
            tracing::info!("CLI override: connection target set");
        }

        if let Some(port) = port {
            self.status_server.bind_addr.set_port(port);
            tracing::info!("CLI override: status server port set to {}", port);
        }

        if let Some(max_retries) = max_retries {
            self.retry.max_retries = max_retries;
            tracing::info!("CLI override: max retries set to {}", max_retries);
        }

        if let Some(interval) = retry_interval {
            match humantime::parse_duration(interval) {
                Ok(interval) => {
                    self.retry.interval = interval;
                    tracing::info!("CLI override: retry interval set to {:?}", interval);
                }
                Err(_) => tracing::warn!("Invalid retry interval provided: {}", interval),
            }
        }

        if no_status_server {
            self.status_server.enabled = false;
            tracing::info!("CLI override: status server disabled");
        }
    }
}

/// Lenient boolean for optional switches: true/false, 1/0, yes/no, on/off
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
