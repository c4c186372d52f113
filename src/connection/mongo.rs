//! MongoDB Store Driver
//!
//! Wraps a `mongodb::Client`. Reachability is confirmed with an `admin`
//! ping, and a heartbeat task keeps pinging so an unsolicited drop shows up
//! as a `Disconnected` event.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::Client;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, trace, warn};

use super::driver::{StoreDriver, EVENT_CHANNEL_CAPACITY};
use super::error::DriverError;
use super::types::{AddressFamily, ConnectOptions, LifecycleEvent, ReadyState};

const DIAGNOSTICS_TARGET: &str = "coursehub::driver";

/// MongoDB implementation of [`StoreDriver`]
pub struct MongoDriver {
    shared: Arc<Shared>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    events: broadcast::Sender<LifecycleEvent>,
    ready_state: AtomicU8,
    client: RwLock<Option<Client>>,
    host: RwLock<Option<String>>,
    name: RwLock<Option<String>>,
    diagnostics: AtomicBool,
}

impl Shared {
    fn set_ready_state(&self, state: ReadyState) {
        self.ready_state.store(state as u8, Ordering::SeqCst);
    }

    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine; the manager subscribes before connecting.
        let _ = self.events.send(event);
    }

    fn diagnostic(&self, command: &str, detail: &str) {
        if self.diagnostics.load(Ordering::Relaxed) {
            info!(target: DIAGNOSTICS_TARGET, command, detail, "mongodb");
        } else {
            trace!(target: DIAGNOSTICS_TARGET, command, detail, "mongodb");
        }
    }
}

impl MongoDriver {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                events,
                ready_state: AtomicU8::new(ReadyState::Disconnected as u8),
                client: RwLock::new(None),
                host: RwLock::new(None),
                name: RwLock::new(None),
                diagnostics: AtomicBool::new(false),
            }),
            monitor: Mutex::new(None),
        }
    }

    fn stop_monitor(&self) {
        let handle = match self.monitor.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    fn start_monitor(&self, client: Client, every: Duration) {
        let handle = tokio::spawn(heartbeat(Arc::clone(&self.shared), client, every));
        match self.monitor.lock() {
            Ok(mut guard) => *guard = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }
    }

    fn fail(&self, err: DriverError) -> DriverError {
        self.shared.set_ready_state(ReadyState::Disconnected);
        self.shared.emit(LifecycleEvent::Error {
            message: err.to_string(),
        });
        err
    }
}

impl Default for MongoDriver {
    fn default() -> Self {
        Self::new()
    }
}

async fn ping(client: &Client) -> mongodb::error::Result<()> {
    client
        .database("admin")
        .run_command(doc! { "ping": 1 }, None)
        .await
        .map(|_| ())
}

/// Ping on a fixed interval until the first failure, then report the drop
async fn heartbeat(shared: Arc<Shared>, client: Client, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        shared.diagnostic("ping", "heartbeat");
        match ping(&client).await {
            Ok(()) => {}
            Err(e) => {
                warn!(error = %e, "Store heartbeat failed");
                shared.set_ready_state(ReadyState::Disconnected);
                shared.emit(LifecycleEvent::Error {
                    message: e.to_string(),
                });
                shared.emit(LifecycleEvent::Disconnected);
                break;
            }
        }
    }
}

/// The mongodb client has no family knob, so any preference other than
/// `Any` goes unapplied and operators are told so.
fn address_family_note(family: AddressFamily) -> Option<&'static str> {
    match family {
        AddressFamily::Any => None,
        AddressFamily::Ipv4 | AddressFamily::Ipv6 => {
            Some("Address family preference not applied, the system resolver picks the family")
        }
    }
}

fn write_slot(slot: &RwLock<Option<String>>, value: Option<String>) {
    match slot.write() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}

fn read_slot(slot: &RwLock<Option<String>>) -> Option<String> {
    match slot.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

#[async_trait]
impl StoreDriver for MongoDriver {
    fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.shared.events.subscribe()
    }

    fn validate_target(&self, uri: &str) -> Result<(), DriverError> {
        if uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://") {
            Ok(())
        } else {
            Err(DriverError::InvalidTarget(
                "connection string must start with mongodb:// or mongodb+srv://".to_string(),
            ))
        }
    }

    async fn connect(&self, uri: &str, options: &ConnectOptions) -> Result<(), DriverError> {
        self.stop_monitor();
        self.shared
            .diagnostics
            .store(options.debug, Ordering::Relaxed);
        self.shared.set_ready_state(ReadyState::Connecting);
        self.shared.emit(LifecycleEvent::Connecting);

        let mut client_options = match ClientOptions::parse(uri).await {
            Ok(parsed) => parsed,
            Err(e) => {
                let err = match *e.kind {
                    ErrorKind::InvalidArgument { .. } => DriverError::InvalidTarget(e.to_string()),
                    _ => DriverError::Unreachable(e.to_string()),
                };
                return Err(self.fail(err));
            }
        };

        client_options.app_name = Some(options.app_name.clone());
        client_options.max_pool_size = Some(options.max_pool_size);
        client_options.server_selection_timeout = Some(options.server_selection_timeout);
        client_options.max_idle_time = Some(options.socket_timeout);
        client_options.connect_timeout = Some(options.connect_timeout);
        client_options.heartbeat_freq = Some(options.heartbeat_interval);

        if let Some(note) = address_family_note(options.address_family) {
            info!(family = ?options.address_family, "{}", note);
        }

        let host = client_options.hosts.first().map(|h| h.to_string());
        let name = options
            .database_name
            .clone()
            .or_else(|| client_options.default_database.clone());

        let client = match Client::with_options(client_options) {
            Ok(client) => client,
            Err(e) => return Err(self.fail(DriverError::Unreachable(e.to_string()))),
        };

        self.shared.diagnostic("ping", "connect");
        if let Err(e) = ping(&client).await {
            return Err(self.fail(DriverError::Unreachable(e.to_string())));
        }

        write_slot(&self.shared.host, host);
        write_slot(&self.shared.name, name);
        let previous = match self.shared.client.write() {
            Ok(mut guard) => guard.replace(client.clone()),
            Err(poisoned) => poisoned.into_inner().replace(client.clone()),
        };
        drop(previous);

        self.shared.set_ready_state(ReadyState::Connected);
        self.shared.emit(LifecycleEvent::Connected);
        self.start_monitor(client, options.heartbeat_interval);
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.stop_monitor();
        let client = match self.shared.client.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(client) = client {
            self.shared.set_ready_state(ReadyState::Disconnecting);
            self.shared.diagnostic("shutdown", "close");
            client.shutdown().await;
        }

        self.shared.set_ready_state(ReadyState::Disconnected);
        self.shared.emit(LifecycleEvent::Closed);
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.shared.ready_state.load(Ordering::SeqCst))
    }

    fn host(&self) -> Option<String> {
        read_slot(&self.shared.host)
    }

    fn name(&self) -> Option<String> {
        read_slot(&self.shared.name)
    }
}
