//! Shared application state for Axum handlers.
//!
//! This module provides thread-safe, clonable state that is shared across
//! the gated and admin routers. It includes:
//!
//! - **Gate**: The provisioned maintenance gate and its shared flag
//! - **Upstream**: The HTTP client and base URL requests are forwarded to
//! - **Configuration**: Runtime configuration access
//!
//! # Structured Concurrency
//!
//! Held requests wait on the `CancellationToken` owned here. Call
//! `shutdown()` when the server stops accepting connections so every held
//! request resolves to the maintenance response instead of sitting out its
//! retention window.

use std::sync::Arc;

use reqwest::{Client, Url};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::gate::MaintenanceGate;

/// Shared application state for Axum handlers.
///
/// Cloned for each request handler. All internal data is wrapped in `Arc`
/// or is internally reference counted.
#[derive(Clone)]
pub struct AppState {
    /// The provisioned maintenance gate
    pub gate: Arc<MaintenanceGate>,
    /// Connection-pooled client for upstream forwarding
    pub http_client: Client,
    /// Base URL requests are forwarded to
    pub upstream: Arc<Url>,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Application configuration
    pub config: Arc<Config>,
    /// Serializes admin toggles so the status file and the flag agree
    pub toggle_lock: Arc<Mutex<()>>,
    /// Cancelled on shutdown; releases held requests
    shutdown: CancellationToken,
}

impl AppState {
    /// Create application state from a provisioned gate and configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the upstream URL does not parse and
    /// `AppError::Internal` if the HTTP client cannot be built.
    pub fn new(gate: MaintenanceGate, config: Config) -> AppResult<Self> {
        let upstream = Url::parse(&config.upstream_url).map_err(|e| {
            AppError::ConfigError(format!("Invalid UPSTREAM_URL '{}': {e}", config.upstream_url))
        })?;

        let http_client = Client::builder()
            .timeout(config.upstream_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            gate: Arc::new(gate),
            http_client,
            upstream: Arc::new(upstream),
            started_at: Instant::now(),
            config: Arc::new(config),
            toggle_lock: Arc::new(Mutex::new(())),
            shutdown: CancellationToken::new(),
        })
    }

    /// Token the maintenance layer waits on while holding requests.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Release every held request into the maintenance response.
    ///
    /// Idempotent; safe to call from more than one shutdown path.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(
                held_requests = self.gate.held_requests(),
                "Releasing held requests for shutdown"
            );
        }
        self.shutdown.cancel();
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
