//! Graceful Shutdown Handling
//!
//! This module listens for SIGTERM/SIGINT, tells long-running tasks to stop and
//! runs the registered shutdown hooks exactly once. The hooks' outcome decides
//! the process exit code.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::signal;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, error, info, warn};

use crate::connection::ConnectionManager;
use crate::Result;

/// Something that must be torn down before the process exits
#[async_trait]
pub trait ShutdownHook: Send + Sync {
    async fn on_shutdown(&self) -> Result<()>;
}

#[async_trait]
impl ShutdownHook for ConnectionManager {
    async fn on_shutdown(&self) -> Result<()> {
        self.shutdown().await?;
        Ok(())
    }
}

/// Outcome of running the shutdown hooks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub exit_code: i32,
    pub failures: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Shutdown coordinator that manages graceful shutdown process
pub struct ShutdownCoordinator {
    /// Broadcast sender for shutdown signal
    shutdown_tx: broadcast::Sender<()>,
    hooks: Mutex<Vec<(String, Arc<dyn ShutdownHook>)>>,
    report: OnceCell<ShutdownReport>,
    /// Upper bound for each hook
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shutdown_tx,
            hooks: Mutex::new(Vec::new()),
            report: OnceCell::new(),
            timeout,
        }
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Register a hook. Hooks run in registration order.
    pub fn register(&self, name: &str, hook: Arc<dyn ShutdownHook>) {
        debug!("Registering shutdown hook: {}", name);
        match self.hooks.lock() {
            Ok(mut hooks) => hooks.push((name.to_string(), hook)),
            Err(poisoned) => poisoned.into_inner().push((name.to_string(), hook)),
        }
    }

    /// Start listening for shutdown signals (SIGTERM, SIGINT)
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        self.trigger();
        Ok(())
    }

    /// Tell subscribers to stop without waiting for an OS signal
    pub fn trigger(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            debug!("No shutdown subscribers: {}", e);
        }
    }

    /// Run every registered hook once and compute the exit code.
    ///
    /// A second call, including one racing the first, returns the same report
    /// without running anything again.
    pub async fn run_hooks(&self) -> ShutdownReport {
        self.report.get_or_init(|| self.execute_hooks()).await.clone()
    }

    async fn execute_hooks(&self) -> ShutdownReport {
        let hooks: Vec<(String, Arc<dyn ShutdownHook>)> = match self.hooks.lock() {
            Ok(hooks) => hooks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        info!("Running {} shutdown hooks (timeout: {:?} each)", hooks.len(), self.timeout);
        let mut failures = Vec::new();

        for (name, hook) in hooks {
            match tokio::time::timeout(self.timeout, hook.on_shutdown()).await {
                Ok(Ok(())) => {
                    debug!("Shutdown hook '{}' completed", name);
                }
                Ok(Err(e)) => {
                    error!("Shutdown hook '{}' failed: {:#}", name, e);
                    failures.push(format!("{}: {}", name, e));
                }
                Err(_) => {
                    warn!("Shutdown hook '{}' timed out after {:?}", name, self.timeout);
                    failures.push(format!("{}: timed out", name));
                }
            }
        }

        let exit_code = if failures.is_empty() { 0 } else { 1 };
        info!("Shutdown hooks finished, exit code {}", exit_code);

        ShutdownReport { exit_code, failures }
    }
}
