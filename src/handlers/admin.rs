//! Maintenance control endpoints.
//!
//! # Endpoints
//!
//! - `GET /maintenance/status` - Current flag and retention timeout
//! - `POST /maintenance/set` - Switch maintenance mode
//!
//! # Persistence
//!
//! When `MAINTENANCE_STATUS_FILE` is set, a toggle writes the new record
//! first and only then changes the in-memory state. A failed write leaves
//! both the previous file and the running state as they were.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use tracing::{info, instrument};

use crate::error::{AppError, AppResult};
use crate::gate::StatusRecord;
use crate::metrics;
use crate::models::{MaintenanceStatusResponse, SetMaintenanceRequest};
use crate::persistence::write_status_file;
use crate::state::AppState;

/// Report the current maintenance state.
///
/// # Response Body
///
/// ```json
/// { "enabled": true, "request_retention_mode_timeout": 30 }
/// ```
#[instrument(skip(state))]
pub async fn get_status(State(state): State<AppState>) -> Json<MaintenanceStatusResponse> {
    Json(state.gate.state().snapshot().into())
}

/// Switch maintenance mode on or off.
///
/// # Request Body
///
/// ```json
/// { "enabled": true, "request_retention_mode_timeout": 30 }
/// ```
///
/// `request_retention_mode_timeout` defaults to 0 (no retention) when omitted.
/// The body is parsed here rather than through the `Json` extractor so that a
/// malformed body goes through the sanitized 400 path regardless of its
/// `Content-Type`.
#[instrument(skip(state, body), fields(body_len = body.len()))]
pub async fn set_status(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<MaintenanceStatusResponse>> {
    let request: SetMaintenanceRequest = serde_json::from_slice(&body)?;

    let _guard = state.toggle_lock.lock().await;

    if let Some(path) = state.config.status_file.as_deref() {
        write_status_file(path, &StatusRecord::now(request.enabled))
            .await
            .map_err(|e| AppError::Persistence(format!("{}: {e}", path.display())))?;
    }

    let snapshot = state
        .gate
        .state()
        .apply(request.enabled, request.request_retention_mode_timeout);
    metrics::record_toggle(snapshot.enabled);

    info!(
        enabled = snapshot.enabled,
        retention_timeout_secs = snapshot.retention_timeout_secs,
        "Maintenance mode updated"
    );

    Ok(Json(snapshot.into()))
}
