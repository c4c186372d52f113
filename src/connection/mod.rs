//! Connection Management Module
//!
//! Establishes, monitors, recovers and tears down the single store connection.

pub mod driver;
pub mod error;
pub mod manager;
#[cfg(feature = "mongo")]
pub mod mongo;
pub mod types;

pub use driver::StoreDriver;
pub use error::{ConnectionError, DriverError};
pub use manager::ConnectionManager;
#[cfg(feature = "mongo")]
pub use mongo::MongoDriver;
pub use types::*;
