//! Connection Errors

use thiserror::Error;

/// Errors surfaced by the connection manager
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// Missing or invalid connection target. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transient network or server failure. Retried up to the ceiling.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// Failure while closing the handle during shutdown
    #[error("termination error: {0}")]
    Termination(String),
}

impl ConnectionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectionError::Connectivity(_))
    }
}

/// Errors reported by a store driver
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("invalid connection target: {0}")]
    InvalidTarget(String),

    #[error("store unreachable: {0}")]
    Unreachable(String),

    #[error("close failed: {0}")]
    Close(String),
}

impl From<DriverError> for ConnectionError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::InvalidTarget(msg) => ConnectionError::Configuration(msg),
            DriverError::Unreachable(msg) => ConnectionError::Connectivity(msg),
            DriverError::Close(msg) => ConnectionError::Termination(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_mapping() {
        let err: ConnectionError = DriverError::Unreachable("timed out".into()).into();
        assert!(err.is_retryable());

        let err: ConnectionError = DriverError::InvalidTarget("bad scheme".into()).into();
        assert_eq!(err, ConnectionError::Configuration("bad scheme".into()));
        assert!(!err.is_retryable());

        let err: ConnectionError = DriverError::Close("socket reset".into()).into();
        assert_eq!(err.to_string(), "termination error: socket reset");
    }
}
