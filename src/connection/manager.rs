//! Connection Manager Implementation
//!
//! A single lifecycle task owns the connection state. `connect()` and driver
//! lifecycle events are fed to it one at a time, so a disconnect is never
//! handled while a connect attempt is in flight and at most one retry cycle
//! exists. Readers get published snapshots and never wait on the task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, watch, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::driver::StoreDriver;
use super::error::ConnectionError;
use super::types::{
    ConnectionSettings, ConnectionState, ConnectionStatus, LifecycleEvent, ReadyState,
    RearmPolicy, Snapshot,
};
use crate::metrics::Metrics;

enum Command {
    Connect,
}

/// Owns the single store connection and drives its lifecycle.
///
/// Cloning is cheap; every clone talks to the same lifecycle task.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    settings: ConnectionSettings,
    driver: Arc<dyn StoreDriver>,
    metrics: Arc<Metrics>,
    command_tx: mpsc::UnboundedSender<Command>,
    snapshot_tx: Arc<watch::Sender<Snapshot>>,
    connect_pending: Arc<AtomicBool>,
    closing: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    termination: OnceCell<Result<(), ConnectionError>>,
}

impl ConnectionManager {
    /// Create the manager and start its lifecycle task.
    ///
    /// Subscribes to the driver's lifecycle events before anything can
    /// connect. Must be called from within a Tokio runtime.
    pub fn new(
        settings: ConnectionSettings,
        driver: Arc<dyn StoreDriver>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let events = driver.subscribe();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(Snapshot::default());
        let snapshot_tx = Arc::new(snapshot_tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connect_pending = Arc::new(AtomicBool::new(false));

        metrics.set_connected(false);

        let worker = LifecycleWorker {
            settings: settings.clone(),
            driver: Arc::clone(&driver),
            metrics: Arc::clone(&metrics),
            snapshot_tx: Arc::clone(&snapshot_tx),
            connect_pending: Arc::clone(&connect_pending),
            exhausted: false,
            cycles: 0,
        };
        let handle = tokio::spawn(worker.run(command_rx, events, shutdown_rx));

        info!(
            max_retries = settings.max_retries,
            retry_interval = ?settings.retry_interval,
            "Connection manager initialized"
        );

        Self {
            inner: Arc::new(Inner {
                settings,
                driver,
                metrics,
                command_tx,
                snapshot_tx,
                connect_pending,
                closing: AtomicBool::new(false),
                shutdown_tx,
                worker: Mutex::new(Some(handle)),
                termination: OnceCell::new(),
            }),
        }
    }

    /// Start connecting to the store.
    ///
    /// Fails only for a missing or invalid connection target. Connectivity
    /// failures are retried in the background; watch [`get_status`] for the
    /// outcome. Calling this while connected or while an attempt is already
    /// under way does nothing.
    ///
    /// [`get_status`]: ConnectionManager::get_status
    pub fn connect(&self) -> Result<(), ConnectionError> {
        let uri = match self.inner.settings.uri.as_deref().map(str::trim) {
            Some(uri) if !uri.is_empty() => uri,
            _ => {
                error!("MONGO_URI is not set, refusing to connect");
                return Err(ConnectionError::Configuration(
                    "connection target is not defined (set MONGO_URI)".to_string(),
                ));
            }
        };

        if let Err(e) = self.inner.driver.validate_target(uri) {
            error!(error = %e, "Connection target rejected");
            return Err(ConnectionError::Configuration(e.to_string()));
        }

        if self.inner.closing.load(Ordering::SeqCst) {
            warn!("Connect requested after shutdown began, ignoring");
            return Err(ConnectionError::Termination(
                "connection manager is closed".to_string(),
            ));
        }

        if self
            .inner
            .connect_pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Connect already requested, ignoring duplicate call");
            return Ok(());
        }

        match self.state() {
            ConnectionState::Disconnected => {}
            state => {
                self.inner.connect_pending.store(false, Ordering::SeqCst);
                debug!(state = %state, "Connect requested while not disconnected, ignoring");
                return Ok(());
            }
        }

        if self.inner.command_tx.send(Command::Connect).is_err() {
            self.inner.connect_pending.store(false, Ordering::SeqCst);
            return Err(ConnectionError::Termination(
                "connection lifecycle task has stopped".to_string(),
            ));
        }

        Ok(())
    }

    /// Read-only snapshot of the connection. Never blocks.
    pub fn get_status(&self) -> ConnectionStatus {
        let snapshot = *self.inner.snapshot_tx.borrow();
        ConnectionStatus {
            connected: snapshot.connected,
            ready_state: self.inner.driver.ready_state(),
            host: self.inner.driver.host(),
            name: self.inner.driver.name(),
            state: snapshot.state,
            retry_count: snapshot.retry_count,
            retries_exhausted: snapshot.retries_exhausted,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.snapshot_tx.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.inner.snapshot_tx.borrow().connected
    }

    pub fn retry_count(&self) -> u32 {
        self.inner.snapshot_tx.borrow().retry_count
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Wait until the status satisfies `predicate` and return that status
    pub async fn wait_until<F>(&self, mut predicate: F) -> ConnectionStatus
    where
        F: FnMut(&ConnectionStatus) -> bool,
    {
        let mut changes = self.inner.snapshot_tx.subscribe();
        loop {
            let status = self.get_status();
            if predicate(&status) {
                return status;
            }
            if changes.changed().await.is_err() {
                return self.get_status();
            }
        }
    }

    /// Close the store connection.
    ///
    /// Stops the lifecycle task (cancelling any retry delay or in-flight
    /// attempt), then closes the driver handle within the configured close
    /// timeout. The state ends up `Closed` whether or not the close succeeds.
    /// Runs once; later and concurrent callers get the first call's result.
    pub async fn shutdown(&self) -> Result<(), ConnectionError> {
        self.inner
            .termination
            .get_or_init(|| self.inner.terminate())
            .await
            .clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.termination.initialized()
    }
}

impl Inner {
    async fn terminate(&self) -> Result<(), ConnectionError> {
        info!("Termination requested, closing store connection");
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);

        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Connection lifecycle task failed");
                }
            }
        }

        let result = match timeout(self.settings.close_timeout, self.driver.close()).await {
            Ok(Ok(())) => {
                info!("Store connection closed due to app termination");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Error closing store connection");
                Err(ConnectionError::Termination(e.to_string()))
            }
            Err(_) => {
                error!(
                    timeout = ?self.settings.close_timeout,
                    "Timed out closing store connection"
                );
                Err(ConnectionError::Termination(format!(
                    "close did not finish within {:?}",
                    self.settings.close_timeout
                )))
            }
        };

        let previous = self.snapshot_tx.borrow().state;
        self.snapshot_tx.send_modify(|s| {
            s.connected = false;
            s.state = ConnectionState::Closed;
        });
        self.metrics.set_connected(false);
        info!(from = %previous, to = %ConnectionState::Closed, "Connection state changed");

        result
    }
}

/// Outcome of waiting on something the shutdown signal can interrupt
enum Interruptible<T> {
    Done(T),
    Cancelled,
}

async fn wait_closed(shutdown: &mut watch::Receiver<bool>) {
    // An error means the manager itself is gone, which is also a stop.
    let _ = shutdown.wait_for(|closing| *closing).await;
}

/// The lifecycle task. Only this task mutates `connected` and the retry count.
struct LifecycleWorker {
    settings: ConnectionSettings,
    driver: Arc<dyn StoreDriver>,
    metrics: Arc<Metrics>,
    snapshot_tx: Arc<watch::Sender<Snapshot>>,
    connect_pending: Arc<AtomicBool>,
    exhausted: bool,
    /// Number of attempt cycles run so far
    cycles: u64,
}

impl LifecycleWorker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: broadcast::Receiver<LifecycleEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!("Connection lifecycle task started");
        let mut events_open = true;

        loop {
            let cycles = self.cycles;

            tokio::select! {
                biased;

                _ = wait_closed(&mut shutdown) => break,

                command = commands.recv() => match command {
                    Some(Command::Connect) => self.handle_connect(&mut shutdown).await,
                    None => break,
                },

                event = events.recv(), if events_open => match event {
                    Ok(event) => self.handle_event(event, &mut shutdown).await,
                    Err(RecvError::Lagged(skipped)) => self.report_lag(skipped),
                    Err(RecvError::Closed) => {
                        warn!("Driver lifecycle event channel closed");
                        events_open = false;
                    }
                },
            }

            if events_open && self.cycles != cycles {
                events_open = self.discard_cycle_events(&mut events, &mut shutdown).await;
            }
        }

        debug!("Connection lifecycle task stopped");
    }

    /// Drop the disconnects that piled up while a cycle was running.
    ///
    /// The cycle already answered them, so replaying them would start
    /// another cycle for the same drop. A disconnect seen while connected is
    /// a new drop and anything else is handled as usual. Returns false when
    /// the event channel has closed.
    async fn discard_cycle_events(
        &mut self,
        events: &mut broadcast::Receiver<LifecycleEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let mut discarded = 0usize;
        loop {
            match events.try_recv() {
                Ok(LifecycleEvent::Disconnected)
                    if self.snapshot().state != ConnectionState::Connected =>
                {
                    discarded += 1;
                }
                Ok(event) => self.handle_event(event, shutdown).await,
                Err(TryRecvError::Lagged(skipped)) => self.report_lag(skipped),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => {
                    warn!("Driver lifecycle event channel closed");
                    return false;
                }
            }
        }
        if discarded > 0 {
            debug!(discarded, "Discarded disconnect events raised during the last cycle");
        }
        true
    }

    fn report_lag(&self, skipped: u64) {
        if self.snapshot().state == ConnectionState::Connected {
            warn!(skipped, "Missed driver lifecycle events");
        } else {
            // Failed attempts emit events faster than a retry cycle reads them
            debug!(skipped, "Skipped driver lifecycle events while not connected");
        }
    }

    fn snapshot(&self) -> Snapshot {
        *self.snapshot_tx.borrow()
    }

    fn transition(&self, to: ConnectionState) {
        let from = self.snapshot().state;
        if from == to {
            return;
        }
        self.snapshot_tx.send_modify(|s| s.state = to);
        info!(from = %from, to = %to, "Connection state changed");
    }

    fn set_connected(&self, connected: bool) {
        self.snapshot_tx.send_modify(|s| s.connected = connected);
        self.metrics.set_connected(connected);
    }

    fn set_retry_count(&mut self, retry_count: u32, exhausted: bool) {
        self.exhausted = exhausted;
        self.snapshot_tx.send_modify(|s| {
            s.retry_count = retry_count;
            s.retries_exhausted = exhausted;
        });
    }

    async fn handle_connect(&mut self, shutdown: &mut watch::Receiver<bool>) {
        let state = self.snapshot().state;
        if state != ConnectionState::Disconnected {
            self.connect_pending.store(false, Ordering::SeqCst);
            debug!(state = %state, "Ignoring connect request");
            return;
        }

        // A manual connect starts a fresh retry budget.
        self.set_retry_count(0, false);
        self.transition(ConnectionState::Connecting);
        self.connect_pending.store(false, Ordering::SeqCst);

        self.run_attempts(shutdown).await;
    }

    async fn handle_event(&mut self, event: LifecycleEvent, shutdown: &mut watch::Receiver<bool>) {
        let snapshot = self.snapshot();
        match event {
            LifecycleEvent::Connecting => {
                debug!("Driver reports connecting");
            }
            LifecycleEvent::Connected => {
                if snapshot.connected {
                    debug!("Driver reports connected, already connected");
                } else if self.driver.ready_state() == ReadyState::Connected
                    && snapshot.state == ConnectionState::Disconnected
                {
                    info!("Driver recovered the store connection on its own");
                    self.set_retry_count(0, false);
                    self.set_connected(true);
                    self.transition(ConnectionState::Connected);
                } else {
                    debug!(state = %snapshot.state, "Ignoring stale connected event");
                }
            }
            LifecycleEvent::Error { message } => {
                error!(error = %message, "Store connection error");
                if snapshot.connected && self.driver.ready_state() != ReadyState::Connected {
                    self.set_connected(false);
                }
            }
            LifecycleEvent::Disconnected => {
                info!("Store disconnected");
                self.handle_disconnection(shutdown).await;
            }
            LifecycleEvent::Closed => {
                debug!("Driver reports handle closed");
            }
        }
    }

    /// React to an unsolicited disconnect.
    ///
    /// Starts at most one reconnect cycle per event, and none when the driver
    /// already reports the handle live again.
    async fn handle_disconnection(&mut self, shutdown: &mut watch::Receiver<bool>) {
        if self.driver.ready_state() == ReadyState::Connected {
            debug!("Driver handle is live again, ignoring stale disconnect event");
            return;
        }

        let snapshot = self.snapshot();
        match snapshot.state {
            ConnectionState::Connected => {
                self.metrics.record_disconnect();
                self.set_connected(false);
                self.transition(ConnectionState::Reconnecting);
                info!("Store is not connected, attempting to reconnect");
                self.run_attempts(shutdown).await;
            }
            ConnectionState::Disconnected if self.exhausted => match self.settings.rearm {
                RearmPolicy::OnDisconnect => {
                    info!("Disconnect after giving up, re-arming retries");
                    self.set_retry_count(0, false);
                    self.transition(ConnectionState::Connecting);
                    self.run_attempts(shutdown).await;
                }
                RearmPolicy::Never => {
                    debug!("Retries exhausted, waiting for an explicit connect");
                }
            },
            state => {
                debug!(state = %state, "Ignoring disconnect event");
            }
        }
    }

    /// Attempt to connect, retrying with a fixed delay until the store
    /// answers, the ceiling is reached, or shutdown begins.
    async fn run_attempts(&mut self, shutdown: &mut watch::Receiver<bool>) {
        let Some(uri) = self.settings.uri.clone() else {
            error!("No connection target configured");
            self.transition(ConnectionState::Disconnected);
            return;
        };

        self.cycles += 1;

        loop {
            self.transition(ConnectionState::Connecting);
            self.metrics.record_connect_attempt();

            let attempt = tokio::select! {
                biased;
                _ = wait_closed(shutdown) => Interruptible::Cancelled,
                result = self.driver.connect(&uri, &self.settings.options) => Interruptible::Done(result),
            };

            let result = match attempt {
                Interruptible::Done(result) => result,
                Interruptible::Cancelled => {
                    debug!("Connect attempt abandoned for shutdown");
                    return;
                }
            };

            match result {
                Ok(()) => {
                    self.set_retry_count(0, false);
                    self.set_connected(true);
                    self.transition(ConnectionState::Connected);
                    info!("Store connected successfully");
                    return;
                }
                Err(e) => {
                    let err = ConnectionError::from(e);
                    error!(error = %err, "Store connection attempt failed");
                    self.metrics.record_connect_failure();
                    self.set_connected(false);

                    if !err.is_retryable() {
                        error!("Connection failure is not retryable, giving up");
                        self.transition(ConnectionState::Disconnected);
                        return;
                    }

                    if !self.handle_connection_error(shutdown).await {
                        return;
                    }
                }
            }
        }
    }

    /// Returns true when another attempt should be made
    async fn handle_connection_error(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let retry_count = self.snapshot().retry_count;
        let max_retries = self.settings.max_retries;

        if retry_count >= max_retries {
            error!(
                max_retries,
                "Giving up on store connection after {} retries", max_retries
            );
            self.metrics.record_give_up();
            self.set_retry_count(retry_count, true);
            self.transition(ConnectionState::Disconnected);
            return false;
        }

        let retry = retry_count + 1;
        self.set_retry_count(retry, false);
        self.metrics.record_retry();
        self.transition(ConnectionState::Reconnecting);
        info!(retry, max_retries, "Retrying connection... ({}/{})", retry, max_retries);

        let delay = tokio::select! {
            biased;
            _ = wait_closed(shutdown) => Interruptible::Cancelled,
            _ = sleep(self.settings.retry_interval) => Interruptible::Done(()),
        };

        match delay {
            Interruptible::Done(()) => true,
            Interruptible::Cancelled => {
                debug!("Retry delay interrupted by shutdown");
                false
            }
        }
    }
}
