//! Status API Types

use serde::Serialize;
use std::collections::HashMap;
use std::time::SystemTime;

/// Envelope for every JSON body under `/api/v1`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: SystemTime,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: SystemTime::now(),
        }
    }
}

/// Health report. `status` is `healthy` or `degraded`.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub uptime_seconds: u64,
    pub checks: HashMap<String, CheckResult>,
    pub timestamp: SystemTime,
}

/// Individual health check result
#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: Option<String>,
}

/// Body returned for unknown routes
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
}
