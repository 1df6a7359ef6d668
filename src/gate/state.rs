//! The shared maintenance flag.
//!
//! [`MaintenanceState`] is an explicitly owned value: the gate and the admin
//! API each hold an `Arc` to the same instance. Reads take a short read lock
//! and copy out a [`MaintenanceSnapshot`]; writes take the write lock only
//! for the assignment and then wake every held request through a
//! [`Notify`]. No lock is ever held across an await point.

use std::path::Path;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tracing::{debug, info, warn};

/// Point-in-time copy of the maintenance state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceSnapshot {
    pub enabled: bool,
    /// Hold window for denied requests, in seconds. `0` disables retention.
    pub retention_timeout_secs: u64,
}

impl MaintenanceSnapshot {
    pub fn retains(&self) -> bool {
        self.retention_timeout_secs > 0
    }
}

/// Persisted status record.
///
/// Only `enabled` is required when reading; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusRecord {
    pub fn now(enabled: bool) -> Self {
        Self {
            enabled,
            updated_at: Some(Utc::now()),
        }
    }

    /// Read a record, treating every failure as "no record".
    pub fn read(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No readable status file");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Malformed status file, using configured default"
                );
                None
            }
        }
    }
}

/// Concurrently readable, atomically togglable maintenance state.
#[derive(Debug, Default)]
pub struct MaintenanceState {
    inner: RwLock<MaintenanceSnapshot>,
    changed: Notify,
}

impl MaintenanceState {
    pub fn new(enabled: bool, retention_timeout_secs: u64) -> Self {
        crate::metrics::set_maintenance_enabled(enabled);
        Self {
            inner: RwLock::new(MaintenanceSnapshot {
                enabled,
                retention_timeout_secs,
            }),
            changed: Notify::new(),
        }
    }

    /// Initial state at startup: a well-formed persisted record wins over
    /// `default_enabled`.
    pub fn restore(
        default_enabled: bool,
        retention_timeout_secs: u64,
        status_file: Option<&Path>,
    ) -> Self {
        let enabled = match status_file.and_then(StatusRecord::read) {
            Some(record) => {
                info!(enabled = record.enabled, "Restored maintenance state from status file");
                record.enabled
            }
            None => default_enabled,
        };
        Self::new(enabled, retention_timeout_secs)
    }

    pub fn snapshot(&self) -> MaintenanceSnapshot {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.snapshot().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.update(|s| s.enabled = enabled);
    }

    pub fn set_retention_timeout(&self, secs: u64) {
        self.update(|s| s.retention_timeout_secs = secs);
    }

    /// Set both fields under a single write lock.
    pub fn apply(&self, enabled: bool, retention_timeout_secs: u64) -> MaintenanceSnapshot {
        self.update(|s| {
            s.enabled = enabled;
            s.retention_timeout_secs = retention_timeout_secs;
        })
    }

    /// Future resolved on the next mutation. Call `enable()` on it before
    /// re-checking the snapshot so a change in between is not missed.
    pub fn changed(&self) -> Notified<'_> {
        self.changed.notified()
    }

    fn update(&self, mutate: impl FnOnce(&mut MaintenanceSnapshot)) -> MaintenanceSnapshot {
        let snapshot = {
            let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            mutate(&mut guard);
            *guard
        };
        crate::metrics::set_maintenance_enabled(snapshot.enabled);
        self.changed.notify_waiters();
        snapshot
    }
}
