//! coursehub - course platform backend service

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursehub::{
    config::{Config, ConfigManager},
    connection::{ConnectionError, ConnectionManager, StoreDriver},
    metrics::Metrics,
    status::StatusServer,
    ShutdownCoordinator,
};

/// CLI arguments for coursehub
#[derive(Parser, Debug)]
#[command(name = "coursehub")]
#[command(about = "coursehub - course platform backend service")]
#[command(version)]
#[command(long_about = "
coursehub - course platform backend service

Configuration priority (highest to lowest):
1. Command-line arguments
2. Environment variables (a .env file in the working directory is loaded first)
3. Configuration file
4. Built-in defaults

Environment variables:
  MONGO_URI                  - MongoDB connection string (required to connect)
  MONGO_DB_NAME              - Database name, overrides the one in MONGO_URI
  MONGO_DEBUG                - Verbose driver diagnostics (true/false)
  COURSEHUB_ENV              - 'development' enables driver diagnostics
  COURSEHUB_MAX_RETRIES      - Reconnection attempts before giving up
  COURSEHUB_RETRY_INTERVAL   - Delay between attempts (e.g., 5s, 500ms)
  COURSEHUB_LOG_LEVEL        - Log level (trace, debug, info, warn, error)
  PORT                       - Status server port
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "coursehub.toml", help = "Path to configuration file")]
    pub config: PathBuf,

    /// MongoDB connection string (overrides MONGO_URI)
    #[arg(long, help = "MongoDB connection string")]
    pub mongo_uri: Option<String>,

    /// Status server port (overrides config file)
    #[arg(short, long, help = "Status server port")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Reconnection attempts before giving up
    #[arg(long, help = "Reconnection attempts before giving up")]
    pub max_retries: Option<u32>,

    /// Delay between reconnection attempts
    #[arg(long, help = "Delay between reconnection attempts (e.g., 5s)")]
    pub retry_interval: Option<String>,

    /// Disable the status HTTP server
    #[arg(long, help = "Disable the status HTTP server")]
    pub no_status_server: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let dotenv = dotenvy::dotenv();

    // Loaded before tracing starts, since the log level comes from the config
    let config_source = args.config.exists().then(|| args.config.clone());
    let mut config = match &config_source {
        Some(path) => ConfigManager::load_from_file(path)?,
        None => ConfigManager::load_from_env()?,
    };
    config.merge_with_cli_args(
        args.mongo_uri.as_deref(),
        args.port,
        args.max_retries,
        args.retry_interval.as_deref(),
        args.no_status_server,
    );
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    config
        .validate()
        .context("Final configuration validation failed")?;

    init_tracing(&args, &config)?;

    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }
    match &config_source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!(
            "No configuration file at {}, using environment and defaults",
            args.config.display()
        ),
    }

    info!("Starting coursehub v{}", env!("CARGO_PKG_VERSION"));

    if args.validate_config {
        info!("Configuration is valid");
        info!("Configuration summary:");
        info!(
            "  Connection target: {}",
            config.redacted_uri().unwrap_or_else(|| "<unset>".to_string())
        );
        info!("  Max pool size: {}", config.database.max_pool_size);
        info!(
            "  Retries: {} every {:?} (rearm: {:?})",
            config.retry.max_retries, config.retry.interval, config.retry.rearm
        );
        info!(
            "  Status server: {}",
            if config.status_server.enabled {
                config.status_server.bind_addr.to_string()
            } else {
                "disabled".to_string()
            }
        );
        return Ok(());
    }

    let metrics = Arc::new(Metrics::new());
    let driver = build_driver()?;
    let connection = ConnectionManager::new(config.connection_settings(), driver, metrics);

    let shutdown_coordinator = ShutdownCoordinator::new(
        config.database.close_timeout + Duration::from_secs(5),
    );
    shutdown_coordinator.register("database", Arc::new(connection.clone()));

    let status_handle = if config.status_server.enabled {
        let server = StatusServer::new(config.status_server.bind_addr, connection.clone());
        let shutdown_rx = shutdown_coordinator.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = server.start(shutdown_rx).await {
                error!("Status server error: {:#}", e);
            }
        }))
    } else {
        info!("Status server disabled");
        None
    };

    info!(
        "Connecting to {}",
        config.redacted_uri().unwrap_or_else(|| "<unset>".to_string())
    );
    if let Err(e) = connection.connect() {
        error!("Cannot start: {}", e);
        let report = shutdown_coordinator.run_hooks().await;
        if let ConnectionError::Configuration(_) = e {
            std::process::exit(1);
        }
        std::process::exit(report.exit_code);
    }

    if let Err(e) = shutdown_coordinator.listen_for_signals().await {
        error!("Error setting up signal handlers: {}", e);
    }

    info!("Initiating graceful shutdown...");
    let report = shutdown_coordinator.run_hooks().await;

    if let Some(handle) = status_handle {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            warn!("Status server did not stop in time");
        }
    }

    for failure in &report.failures {
        error!("Shutdown failure: {}", failure);
    }
    info!("Shutdown complete (exit code {})", report.exit_code);
    std::process::exit(report.exit_code);
}

#[cfg(feature = "mongo")]
fn build_driver() -> Result<Arc<dyn StoreDriver>> {
    Ok(Arc::new(coursehub::connection::MongoDriver::new()))
}

#[cfg(not(feature = "mongo"))]
fn build_driver() -> Result<Arc<dyn StoreDriver>> {
    anyhow::bail!("built without a store driver; enable the `mongo` feature")
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, config: &Config) -> Result<()> {
    let log_level = if args.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };

    let mut directives = log_level;
    if config.database.debug {
        directives.push_str(",coursehub::driver=info");
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directives));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
