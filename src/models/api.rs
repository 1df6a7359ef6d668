use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gate::MaintenanceSnapshot;

/// Request to switch maintenance mode.
#[derive(Debug, Deserialize)]
pub struct SetMaintenanceRequest {
    /// New maintenance flag
    pub enabled: bool,
    /// Seconds to hold denied requests; 0 (the default) answers immediately
    #[serde(default)]
    pub request_retention_mode_timeout: u64,
}

/// Current maintenance state as reported by the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceStatusResponse {
    /// Whether maintenance mode is on
    pub enabled: bool,
    /// Seconds denied requests are held before the maintenance response
    pub request_retention_mode_timeout: u64,
}

impl From<MaintenanceSnapshot> for MaintenanceStatusResponse {
    fn from(snapshot: MaintenanceSnapshot) -> Self {
        Self {
            enabled: snapshot.enabled,
            request_retention_mode_timeout: snapshot.retention_timeout_secs,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Whether maintenance mode is on
    pub maintenance_enabled: bool,
    /// Requests currently held by the gate
    pub held_requests: usize,
    /// Service version
    pub version: String,
    /// Seconds since the gate started
    pub uptime_seconds: u64,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}
