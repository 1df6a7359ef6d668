//! Effective client address resolution behind reverse proxies.
//!
//! Forwarding headers are only believed when the direct peer is a configured
//! trusted proxy. The `X-Forwarded-For` chain is scanned right to left (most
//! recent hop first), skipping entries that don't parse or that are
//! themselves trusted proxies. The first remaining entry is the client.
//!
//! If the chain yields nothing, a valid non-proxy `X-Real-IP` is used, and
//! failing that the direct peer address.

use std::net::IpAddr;

use axum::http::HeaderMap;
use tracing::trace;

use super::address::NetworkAllowSet;
use super::error::{GateError, GateResult};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Networks whose forwarding headers are believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxySet(NetworkAllowSet);

impl TrustedProxySet {
    /// Parse trusted proxy entries. Blank entries are skipped; any other
    /// invalid entry fails the whole set.
    pub fn parse<I, S>(entries: I) -> GateResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries: Vec<String> = entries
            .into_iter()
            .map(|e| e.as_ref().trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        NetworkAllowSet::classify(&entries).map(Self)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if `candidate` parses and belongs to a trusted proxy network.
    pub fn is_trusted(&self, candidate: &str) -> bool {
        self.0.matches(candidate)
    }
}

/// Resolves the address a request should be classified by.
#[derive(Debug, Clone, Default)]
pub struct ProxyTrustResolver {
    use_forwarded_headers: bool,
    trusted: TrustedProxySet,
}

impl ProxyTrustResolver {
    /// Build a resolver.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::NoTrustedProxies`] when header trust is on but the
    /// trusted set is empty.
    pub fn new(use_forwarded_headers: bool, trusted: TrustedProxySet) -> GateResult<Self> {
        if use_forwarded_headers && trusted.is_empty() {
            return Err(GateError::NoTrustedProxies);
        }
        Ok(Self {
            use_forwarded_headers,
            trusted,
        })
    }

    /// Resolver that always returns the direct peer.
    pub fn direct() -> Self {
        Self::default()
    }

    /// Resolve from the raw peer address (`ip`, `ip:port` or `[ipv6]:port`)
    /// and request headers.
    pub fn resolve(&self, peer: &str, headers: &HeaderMap) -> String {
        self.resolve_client_address(
            peer,
            header_str(headers, X_FORWARDED_FOR),
            header_str(headers, X_REAL_IP),
        )
    }

    /// Header-agnostic form of [`resolve`](Self::resolve).
    pub fn resolve_client_address(
        &self,
        peer: &str,
        forwarded_for: Option<&str>,
        real_ip: Option<&str>,
    ) -> String {
        let peer = strip_port(peer);

        if !self.use_forwarded_headers || !self.trusted.is_trusted(peer) {
            return peer.to_string();
        }

        if let Some(chain) = forwarded_for {
            let client = chain
                .rsplit(',')
                .map(str::trim)
                .filter(|hop| !hop.is_empty())
                .find(|hop| hop.parse::<IpAddr>().is_ok() && !self.trusted.is_trusted(hop));

            if let Some(client) = client {
                trace!(client = client, "Resolved client from X-Forwarded-For");
                return client.to_string();
            }
        }

        if let Some(hint) = real_ip.map(str::trim).filter(|v| !v.is_empty())
            && hint.parse::<IpAddr>().is_ok()
            && !self.trusted.is_trusted(hint)
        {
            trace!(client = hint, "Resolved client from X-Real-IP");
            return hint.to_string();
        }

        peer.to_string()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Strip a port suffix from a peer address.
///
/// `[::1]:8080` becomes `::1`, `10.0.0.1:80` becomes `10.0.0.1`. Values with
/// no port (including bare IPv6) are returned unchanged.
pub fn strip_port(addr: &str) -> &str {
    let addr = addr.trim();

    if let Some(rest) = addr.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, _)) => host,
            None => addr,
        };
    }

    match addr.split_once(':') {
        Some((host, port)) if !port.contains(':') => host,
        _ => addr,
    }
}
