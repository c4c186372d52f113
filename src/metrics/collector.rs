//! Metrics Collector

use prometheus::{Counter, Gauge, Registry, TextEncoder};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

/// Collects and exports connection lifecycle metrics
pub struct Metrics {
    prometheus_registry: Registry,

    // Prometheus metrics
    connect_attempts_total: Counter,
    connect_failures_total: Counter,
    retries_total: Counter,
    disconnects_total: Counter,
    give_ups_total: Counter,
    connected: Gauge,

    // Internal counters
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    retries: AtomicU64,
    disconnects: AtomicU64,
    give_ups: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let prometheus_registry = Registry::new();

        let connect_attempts_total = Counter::new(
            "coursehub_db_connect_attempts_total",
            "Total number of store connect attempts"
        ).expect("Failed to create connect_attempts_total counter");

        let connect_failures_total = Counter::new(
            "coursehub_db_connect_failures_total",
            "Total number of failed store connect attempts"
        ).expect("Failed to create connect_failures_total counter");

        let retries_total = Counter::new(
            "coursehub_db_retries_total",
            "Total number of scheduled reconnection retries"
        ).expect("Failed to create retries_total counter");

        let disconnects_total = Counter::new(
            "coursehub_db_disconnects_total",
            "Total number of unsolicited disconnects"
        ).expect("Failed to create disconnects_total counter");

        let give_ups_total = Counter::new(
            "coursehub_db_give_ups_total",
            "Total number of times the retry ceiling was reached"
        ).expect("Failed to create give_ups_total counter");

        let connected = Gauge::new(
            "coursehub_db_connected",
            "1 when the store connection is live, 0 otherwise"
        ).expect("Failed to create connected gauge");

        prometheus_registry.register(Box::new(connect_attempts_total.clone()))
            .expect("Failed to register connect_attempts_total");
        prometheus_registry.register(Box::new(connect_failures_total.clone()))
            .expect("Failed to register connect_failures_total");
        prometheus_registry.register(Box::new(retries_total.clone()))
            .expect("Failed to register retries_total");
        prometheus_registry.register(Box::new(disconnects_total.clone()))
            .expect("Failed to register disconnects_total");
        prometheus_registry.register(Box::new(give_ups_total.clone()))
            .expect("Failed to register give_ups_total");
        prometheus_registry.register(Box::new(connected.clone()))
            .expect("Failed to register connected");

        Self {
            prometheus_registry,
            connect_attempts_total,
            connect_failures_total,
            retries_total,
            disconnects_total,
            give_ups_total,
            connected,
            connect_attempts: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            give_ups: AtomicU64::new(0),
        }
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts_total.inc();
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures_total.inc();
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries_total.inc();
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnect(&self) {
        self.disconnects_total.inc();
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_give_up(&self) {
        self.give_ups_total.inc();
        self.give_ups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.set(if connected { 1.0 } else { 0.0 });
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.prometheus_registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }

    pub fn get_connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    pub fn get_connect_failures(&self) -> u64 {
        self.connect_failures.load(Ordering::Relaxed)
    }

    pub fn get_retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn get_disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }

    pub fn get_give_ups(&self) -> u64 {
        self.give_ups.load(Ordering::Relaxed)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
