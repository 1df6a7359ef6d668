//! Maintenance-mode access control and request retention.
//!
//! This module is the decision engine. Hosts call
//! [`MaintenanceGate::evaluate`] once per request and either forward the
//! request or send [`MaintenanceGate::maintenance_response`].
//!
//! # Components
//!
//! - [`address`] - IP/CIDR allow-lists
//! - [`proxy_trust`] - client address resolution behind trusted proxies
//! - [`credentials`] - Basic-Auth against an htpasswd file (bcrypt only)
//! - [`bypass`] - paths exempt from gating
//! - [`decision`] - the fixed-order access decision
//! - [`state`] - the shared maintenance flag
//! - [`retention`] - the per-request state machine and hold loop
//! - [`response`] - the 503/401 maintenance response

pub mod address;
pub mod bypass;
pub mod credentials;
pub mod decision;
pub mod error;
pub mod proxy_trust;
pub mod response;
pub mod retention;
pub mod state;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Response};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use address::{AddressFamily, NetworkAllowSet, NetworkEntry};
pub use bypass::BypassPathSet;
pub use credentials::{BasicCredentials, CredentialTable, HashScheme};
pub use decision::{AccessDecision, AccessPolicy, BypassReason, RequestFacts};
pub use error::{GateError, GateResult};
pub use proxy_trust::{ProxyTrustResolver, TrustedProxySet};
pub use response::MaintenanceResponder;
pub use retention::{GatePhase, HeldRequest, HoldExit, Resolution, RetentionGate};
pub use state::{MaintenanceSnapshot, MaintenanceState, StatusRecord};

use crate::config::Config;

/// A provisioned gate: the retention state machine plus the response it
/// sends when a request is not let through.
#[derive(Debug)]
pub struct MaintenanceGate {
    retention: RetentionGate,
    responder: MaintenanceResponder,
}

impl MaintenanceGate {
    pub fn new(retention: RetentionGate, responder: MaintenanceResponder) -> Self {
        Self {
            retention,
            responder,
        }
    }

    /// Build every set and table from configuration and restore the
    /// maintenance state from the status file.
    ///
    /// # Errors
    ///
    /// Any invalid allow-list or proxy entry, malformed credential file,
    /// header trust without proxies, or unreadable file is fatal.
    pub fn provision(config: &Config) -> GateResult<Self> {
        let allowed =
            NetworkAllowSet::from_sources(&config.allowed_ips, config.allowed_ips_file.as_deref())?;
        let trusted = TrustedProxySet::parse(&config.trusted_proxies)?;
        let resolver = ProxyTrustResolver::new(config.use_forwarded_headers, trusted)?;
        let credentials = config
            .htpasswd_file
            .as_deref()
            .map(CredentialTable::load)
            .transpose()?;
        let template = config
            .template_file
            .as_deref()
            .map(|path| std::fs::read_to_string(path).map_err(|e| GateError::io(path, e)))
            .transpose()?;

        let policy = AccessPolicy::new(
            BypassPathSet::new(&config.bypass_paths),
            resolver,
            allowed,
            credentials,
        );

        let realm = policy
            .credentials_configured()
            .then_some(config.auth_realm.as_str());
        let responder = MaintenanceResponder::new(config.retry_after_secs, realm, template);

        let state = Arc::new(MaintenanceState::restore(
            config.default_enabled,
            config.retention_timeout(),
            config.status_file.as_deref(),
        ));

        info!(
            enabled = state.is_enabled(),
            allowed_entries = config.allowed_ips.len(),
            forwarded_headers = config.use_forwarded_headers,
            credentials = policy.credentials_configured(),
            bypass_paths = config.bypass_paths.len(),
            retention_timeout_secs = config.retention_timeout(),
            "Maintenance gate provisioned"
        );

        Ok(Self::new(
            RetentionGate::new(state, policy, config.poll_interval),
            responder,
        ))
    }

    pub fn state(&self) -> &Arc<MaintenanceState> {
        self.retention.state()
    }

    pub fn held_requests(&self) -> usize {
        self.retention.held_requests()
    }

    pub async fn evaluate(&self, request: &RequestFacts<'_>, cancel: &CancellationToken) -> Resolution {
        self.retention.evaluate(request, cancel).await
    }

    pub fn maintenance_response(&self, request_headers: &HeaderMap) -> Response<Body> {
        self.responder.respond(request_headers)
    }
}
