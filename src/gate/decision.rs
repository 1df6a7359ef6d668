//! Per-request access decision while maintenance is active.
//!
//! Checks run in a fixed order: bypass path, then the allow-list against the
//! resolved client address, then Basic-Auth credentials. The first match
//! bypasses maintenance; nothing matching means [`AccessDecision::Deny`].

use std::sync::Arc;

use axum::http::{HeaderMap, header};
use tracing::{debug, warn};

use super::address::NetworkAllowSet;
use super::bypass::BypassPathSet;
use super::credentials::{BasicCredentials, CredentialTable};
use super::proxy_trust::ProxyTrustResolver;

/// Why a request was let through during maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    Path,
    Address,
    Credentials,
}

impl BypassReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "bypass_path",
            Self::Address => "bypass_address",
            Self::Credentials => "bypass_credentials",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Bypass(BypassReason),
    Deny,
}

impl AccessDecision {
    pub fn is_bypass(self) -> bool {
        matches!(self, Self::Bypass(_))
    }
}

/// The parts of a request the decision looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestFacts<'a> {
    pub path: &'a str,
    /// Direct peer address, with or without port. Empty if unknown.
    pub peer: &'a str,
    pub headers: &'a HeaderMap,
}

/// Provisioned inputs to [`decide`](AccessPolicy::decide).
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    bypass_paths: BypassPathSet,
    resolver: ProxyTrustResolver,
    allowed: NetworkAllowSet,
    credentials: Option<Arc<CredentialTable>>,
}

impl AccessPolicy {
    pub fn new(
        bypass_paths: BypassPathSet,
        resolver: ProxyTrustResolver,
        allowed: NetworkAllowSet,
        credentials: Option<CredentialTable>,
    ) -> Self {
        Self {
            bypass_paths,
            resolver,
            allowed,
            credentials: credentials.filter(|t| !t.is_empty()).map(Arc::new),
        }
    }

    /// `true` when Basic-Auth can grant access, which also switches the
    /// maintenance response to a 401 challenge.
    pub fn credentials_configured(&self) -> bool {
        self.credentials.is_some()
    }

    pub async fn decide(&self, request: &RequestFacts<'_>) -> AccessDecision {
        if self.bypass_paths.matches(request.path) {
            debug!(path = request.path, "Path bypasses maintenance");
            return AccessDecision::Bypass(BypassReason::Path);
        }

        let client = self.resolver.resolve(request.peer, request.headers);

        if self.allowed.matches(&client) {
            debug!(client = %client, "Client address allowed during maintenance");
            return AccessDecision::Bypass(BypassReason::Address);
        }

        if self.authenticate(request.headers).await {
            debug!(client = %client, "Authenticated client bypasses maintenance");
            return AccessDecision::Bypass(BypassReason::Credentials);
        }

        debug!(client = %client, path = request.path, "Request denied during maintenance");
        AccessDecision::Deny
    }

    /// Verify Basic-Auth credentials on the blocking pool. Any failure,
    /// including a panicked verification task, is "not authenticated".
    async fn authenticate(&self, headers: &HeaderMap) -> bool {
        let Some(table) = &self.credentials else {
            return false;
        };

        let Some(creds) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(BasicCredentials::from_header)
        else {
            return false;
        };

        if !table.contains_user(&creds.username) {
            debug!(username = %creds.username, "Unknown user in Authorization header");
            return false;
        }

        let table = Arc::clone(table);
        tokio::task::spawn_blocking(move || table.verify(&creds.username, &creds.password))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Credential verification task failed");
                false
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use axum::http::HeaderValue;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    use super::*;
    use crate::gate::proxy_trust::TrustedProxySet;

    fn policy(allowed: &[&str], credentials: Option<CredentialTable>) -> AccessPolicy {
        AccessPolicy::new(
            BypassPathSet::new(["/health", "/static/*"]),
            ProxyTrustResolver::direct(),
            NetworkAllowSet::classify(allowed).unwrap(),
            credentials,
        )
    }

    fn admin_table() -> CredentialTable {
        let hash = bcrypt::hash("correct-password", 4).unwrap();
        CredentialTable::parse(&format!("admin:{hash}")).unwrap()
    }

    fn basic_auth(raw: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(raw));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    async fn decide(policy: &AccessPolicy, path: &str, peer: &str, headers: &HeaderMap) -> AccessDecision {
        policy
            .decide(&RequestFacts {
                path,
                peer,
                headers,
            })
            .await
    }

    #[tokio::test]
    async fn test_cidr_allow_list_scenario() {
        let policy = policy(&["10.0.0.0/8"], None);
        let headers = HeaderMap::new();

        assert_eq!(
            decide(&policy, "/", "10.1.2.3:5555", &headers).await,
            AccessDecision::Bypass(BypassReason::Address)
        );
        assert_eq!(
            decide(&policy, "/", "192.168.1.1:5555", &headers).await,
            AccessDecision::Deny
        );
    }

    #[tokio::test]
    async fn test_bypass_path_wins_without_any_match() {
        let policy = policy(&[], None);
        let headers = HeaderMap::new();

        assert_eq!(
            decide(&policy, "/health", "203.0.113.1:1", &headers).await,
            AccessDecision::Bypass(BypassReason::Path)
        );
        assert_eq!(
            decide(&policy, "/static/app.css", "", &headers).await,
            AccessDecision::Bypass(BypassReason::Path)
        );
    }

    #[tokio::test]
    async fn test_credentials_scenario() {
        let policy = policy(&[], Some(admin_table()));
        assert!(policy.credentials_configured());

        assert_eq!(
            decide(&policy, "/", "203.0.113.1:1", &basic_auth("admin:correct-password")).await,
            AccessDecision::Bypass(BypassReason::Credentials)
        );
        assert_eq!(
            decide(&policy, "/", "203.0.113.1:1", &basic_auth("admin:wrong-password")).await,
            AccessDecision::Deny
        );
        assert_eq!(
            decide(&policy, "/", "203.0.113.1:1", &basic_auth("ghost:correct-password")).await,
            AccessDecision::Deny
        );
    }

    #[tokio::test]
    async fn test_address_takes_precedence_over_credentials() {
        let policy = policy(&["10.0.0.0/8"], Some(admin_table()));
        assert_eq!(
            decide(&policy, "/", "10.0.0.5:1", &basic_auth("admin:wrong-password")).await,
            AccessDecision::Bypass(BypassReason::Address)
        );
    }

    #[tokio::test]
    async fn test_malformed_authorization_is_not_authenticated() {
        let policy = policy(&[], Some(admin_table()));
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic %%%"));

        assert_eq!(decide(&policy, "/", "203.0.113.1:1", &headers).await, AccessDecision::Deny);
    }

    #[tokio::test]
    async fn test_empty_credential_table_is_not_configured() {
        let policy = policy(&[], Some(CredentialTable::default()));
        assert!(!policy.credentials_configured());
    }

    #[tokio::test]
    async fn test_unknown_peer_never_matches() {
        let policy = policy(&["0.0.0.0/0", "::/0"], None);
        assert_eq!(decide(&policy, "/", "", &HeaderMap::new()).await, AccessDecision::Deny);
    }

    #[tokio::test]
    async fn test_allow_check_uses_resolved_address() {
        let resolver =
            ProxyTrustResolver::new(true, TrustedProxySet::parse(["10.0.0.1"]).unwrap()).unwrap();
        let policy = AccessPolicy::new(
            BypassPathSet::default(),
            resolver,
            NetworkAllowSet::classify(["198.51.100.0/24"]).unwrap(),
            None,
        );

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.7, 10.0.0.1"));
        assert!(decide(&policy, "/", "10.0.0.1:80", &headers).await.is_bypass());

        // The same header from an untrusted peer is ignored.
        assert_eq!(decide(&policy, "/", "203.0.113.9:80", &headers).await, AccessDecision::Deny);
    }
}
