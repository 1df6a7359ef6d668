//! Health endpoint for the admin listener.
//!
//! `GET /health` bypasses admin key authentication so load balancers and
//! orchestrators can probe it. It reports on the gate process itself, not
//! the upstream: maintenance mode is a normal operating state, so the
//! endpoint answers 200 either way.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "maintenance_enabled": false,
///   "held_requests": 0,
///   "version": "0.1.0",
///   "uptime_seconds": 3600,
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        maintenance_enabled: state.gate.state().is_enabled(),
        held_requests: state.gate.held_requests(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::gate::MaintenanceGate;

    #[tokio::test]
    async fn test_health_reports_maintenance_flag() {
        let config = Config {
            default_enabled: true,
            ..Config::default()
        };
        let gate = MaintenanceGate::provision(&config).unwrap();
        let state = AppState::new(gate, config).unwrap();

        let Json(health) = health_check(State(state)).await;

        assert_eq!(health.status, "healthy");
        assert!(health.maintenance_enabled);
        assert_eq!(health.held_requests, 0);
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
        assert!(health.uptime_seconds < 60);
    }
}
