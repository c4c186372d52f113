//! Scripted store driver shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use coursehub::connection::{
    ConnectOptions, ConnectionSettings, DriverError, LifecycleEvent, ReadyState, StoreDriver,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

pub const TEST_URI: &str = "mongodb://localhost:27017/lms";

/// How `close()` behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseBehavior {
    Succeed,
    Fail,
    Hang,
}

/// Driver whose connect outcomes are queued up front.
///
/// Once the script runs out every further attempt gets `fallback`.
pub struct ScriptedDriver {
    events: broadcast::Sender<LifecycleEvent>,
    script: Mutex<VecDeque<Result<(), DriverError>>>,
    fallback: Mutex<Result<(), DriverError>>,
    attempts: Mutex<Vec<Instant>>,
    live: AtomicBool,
    hang_connect: AtomicBool,
    close_behavior: Mutex<CloseBehavior>,
    closes: AtomicUsize,
}

impl ScriptedDriver {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            events,
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(())),
            attempts: Mutex::new(Vec::new()),
            live: AtomicBool::new(false),
            hang_connect: AtomicBool::new(false),
            close_behavior: Mutex::new(CloseBehavior::Succeed),
            closes: AtomicUsize::new(0),
        })
    }

    /// Queue the outcomes of the next connect attempts
    pub fn script(&self, outcomes: impl IntoIterator<Item = Result<(), DriverError>>) {
        self.script.lock().unwrap().extend(outcomes);
    }

    pub fn fail_always(&self) {
        *self.fallback.lock().unwrap() = Err(unreachable_error());
    }

    pub fn succeed_always(&self) {
        *self.fallback.lock().unwrap() = Ok(());
    }

    pub fn hang_on_connect(&self) {
        self.hang_connect.store(true, Ordering::SeqCst);
    }

    pub fn set_close_behavior(&self, behavior: CloseBehavior) {
        *self.close_behavior.lock().unwrap() = behavior;
    }

    pub fn connects(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn emit(&self, event: LifecycleEvent) {
        let _ = self.events.send(event);
    }

    /// Simulate the server going away under a live handle
    pub fn drop_connection(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.emit(LifecycleEvent::Disconnected);
    }

    /// Simulate the driver's own monitoring bringing the handle back
    pub fn recover(&self) {
        self.live.store(true, Ordering::SeqCst);
        self.emit(LifecycleEvent::Connected);
    }
}

#[async_trait]
impl StoreDriver for ScriptedDriver {
    fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    fn validate_target(&self, uri: &str) -> Result<(), DriverError> {
        if uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://") {
            Ok(())
        } else {
            Err(DriverError::InvalidTarget(uri.to_string()))
        }
    }

    async fn connect(&self, _uri: &str, _options: &ConnectOptions) -> Result<(), DriverError> {
        self.attempts.lock().unwrap().push(Instant::now());

        if self.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let outcome = match self.script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => self.fallback.lock().unwrap().clone(),
        };

        match &outcome {
            Ok(()) => {
                self.live.store(true, Ordering::SeqCst);
                self.emit(LifecycleEvent::Connected);
            }
            Err(e) => {
                self.live.store(false, Ordering::SeqCst);
                self.emit(LifecycleEvent::Error { message: e.to_string() });
            }
        }
        outcome
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.close_behavior.lock().unwrap();
        match behavior {
            CloseBehavior::Succeed => {
                self.live.store(false, Ordering::SeqCst);
                self.emit(LifecycleEvent::Closed);
                Ok(())
            }
            CloseBehavior::Fail => Err(DriverError::Close("server refused to close".to_string())),
            CloseBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    fn ready_state(&self) -> ReadyState {
        if self.live.load(Ordering::SeqCst) {
            ReadyState::Connected
        } else {
            ReadyState::Disconnected
        }
    }

    fn host(&self) -> Option<String> {
        Some("localhost:27017".to_string())
    }

    fn name(&self) -> Option<String> {
        Some("lms".to_string())
    }
}

pub fn unreachable_error() -> DriverError {
    DriverError::Unreachable("connection refused".to_string())
}

pub fn settings(max_retries: u32, retry_interval: Duration) -> ConnectionSettings {
    ConnectionSettings {
        uri: Some(TEST_URI.to_string()),
        max_retries,
        retry_interval,
        ..Default::default()
    }
}

/// Let the lifecycle task drain its queue. Needs paused time to be instant.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
