//! Fuzz testing for the gate's input parsers.
//!
//! Every parser here sees attacker-controlled or operator-supplied text:
//! peer addresses, forwarding headers, `Authorization` values, request paths
//! and credential files. None of them may panic.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the parser fuzz target
//! cargo +nightly fuzz run fuzz_gate_parsing
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_gate_parsing -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `NetworkEntry::parse` / `NetworkAllowSet::matches`: address and CIDR parsing
//! - `strip_port` / `resolve_client_address`: peer and header handling
//! - `BasicCredentials::from_header`: Base64 and UTF-8 decoding
//! - `BypassPathSet::matches`: pattern normalisation and matching
//! - `CredentialTable::parse`: htpasswd line parsing

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use maintenance_gate::gate::proxy_trust::strip_port;
use maintenance_gate::gate::{
    BasicCredentials, BypassPathSet, CredentialTable, NetworkAllowSet, NetworkEntry,
    ProxyTrustResolver, TrustedProxySet,
};

#[derive(Debug, Arbitrary)]
struct GateInput<'a> {
    entry: &'a str,
    peer: &'a str,
    forwarded_for: Option<&'a str>,
    real_ip: Option<&'a str>,
    authorization: &'a str,
    pattern: &'a str,
    path: &'a str,
    htpasswd: &'a str,
}

fuzz_target!(|input: GateInput<'_>| {
    if let Ok(entry) = NetworkEntry::parse(input.entry) {
        let _ = entry.family();
    }

    let allowed = NetworkAllowSet::classify([input.entry]).unwrap_or_default();
    let _ = allowed.matches(input.peer);
    let _ = strip_port(input.peer);

    if let Ok(trusted) = TrustedProxySet::parse(["10.0.0.0/8", "::1"])
        && let Ok(resolver) = ProxyTrustResolver::new(true, trusted)
    {
        let client = resolver.resolve_client_address(input.peer, input.forwarded_for, input.real_ip);
        let _ = allowed.matches(&client);
    }

    let _ = BasicCredentials::from_header(input.authorization);

    let bypass = BypassPathSet::new([input.pattern]);
    let _ = bypass.matches(input.path);

    let _ = CredentialTable::parse(input.htpasswd);
});
