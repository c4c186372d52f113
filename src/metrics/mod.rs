//! Metrics Module
//!
//! Counts connection lifecycle activity and exports it in Prometheus format.

pub mod collector;

pub use collector::Metrics;
