//! IP and CIDR allow-list matching.
//!
//! Entries are parsed once at provisioning time into [`NetworkAllowSet`],
//! which keeps exact addresses and CIDR ranges apart so the common case (a
//! literal match) is a cheap equality scan before any range containment test.
//!
//! # Entry Format
//!
//! - `10.0.0.1`, `2001:db8::1` - individual address (exact match)
//! - `10.0.0.0/8`, `2001:db8::/32` - CIDR range (containment match)
//!
//! Host bits in a CIDR entry are ignored (`10.1.2.3/8` covers `10.0.0.0/8`).
//! IPv4-mapped IPv6 addresses (`::ffff:10.1.2.3`) are compared as IPv4.
//!
//! # File Format
//!
//! ```text
//! # office network
//! 192.168.1.0/24
//! 203.0.113.7     # on-call laptop
//! ```

use std::net::IpAddr;
use std::path::Path;

use ipnet::IpNet;
use tracing::debug;

use super::error::{GateError, GateResult};

/// Address family of a parsed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

impl From<&IpAddr> for AddressFamily {
    fn from(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }
}

/// A single parsed allow-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEntry {
    /// Exact address match.
    Address(IpAddr),
    /// CIDR range match.
    Range(IpNet),
}

impl NetworkEntry {
    /// Parse a trimmed entry. Anything containing `/` is treated as CIDR.
    pub fn parse(raw: &str) -> GateResult<Self> {
        let entry = raw.trim();

        if entry.contains('/') {
            let net: IpNet = entry.parse().map_err(|e: ipnet::AddrParseError| {
                GateError::InvalidCidr {
                    entry: entry.to_string(),
                    reason: e.to_string(),
                }
            })?;
            return Ok(Self::Range(canonical_net(net.trunc())));
        }

        entry
            .parse::<IpAddr>()
            .map(|ip| Self::Address(ip.to_canonical()))
            .map_err(|_| GateError::InvalidAddress {
                entry: entry.to_string(),
            })
    }

    pub fn family(&self) -> AddressFamily {
        match self {
            Self::Address(ip) => AddressFamily::from(ip),
            Self::Range(net) => AddressFamily::from(&net.addr()),
        }
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        match self {
            Self::Address(addr) => addr == ip,
            Self::Range(net) => net.contains(ip),
        }
    }
}

/// Collapse `::ffff:a.b.c.d/(96+n)` into `a.b.c.d/n` so mapped ranges match
/// canonicalised candidates.
fn canonical_net(net: IpNet) -> IpNet {
    if let IpNet::V6(v6) = net
        && let Some(v4) = v6.addr().to_ipv4_mapped()
        && v6.prefix_len() >= 96
        && let Ok(mapped) = ipnet::Ipv4Net::new(v4, v6.prefix_len() - 96)
    {
        return IpNet::V4(mapped);
    }
    net
}

/// Immutable set of addresses and ranges built once from configuration.
///
/// There is no incremental mutation: reconfiguration builds a new set and
/// replaces the old one wholesale.
#[derive(Debug, Clone, Default)]
pub struct NetworkAllowSet {
    addresses: Vec<IpAddr>,
    ranges: Vec<IpNet>,
}

impl NetworkAllowSet {
    /// Classify configuration strings into a set.
    ///
    /// # Errors
    ///
    /// Fails on the first entry that is not a valid address or CIDR range;
    /// no partial set is returned.
    pub fn classify<I, S>(entries: I) -> GateResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for entry in entries {
            set.push(NetworkEntry::parse(entry.as_ref())?);
        }
        Ok(set)
    }

    /// Build a set from inline entries followed by the entries of an
    /// optional file.
    pub fn from_sources(inline: &[String], file: Option<&Path>) -> GateResult<Self> {
        let mut set = Self::classify(inline)?;

        if let Some(path) = file {
            let from_file = read_entries_file(path)?;
            debug!(
                path = %path.display(),
                entries = from_file.len(),
                "Loaded network entries from file"
            );
            for entry in from_file {
                set.push(entry);
            }
        }

        Ok(set)
    }

    fn push(&mut self, entry: NetworkEntry) {
        match entry {
            NetworkEntry::Address(ip) => self.addresses.push(ip),
            NetworkEntry::Range(net) => self.ranges.push(net),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty() && self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addresses.len() + self.ranges.len()
    }

    /// Check a parsed address: literals first, then ranges.
    pub fn contains_ip(&self, ip: &IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.addresses.contains(&ip) || self.ranges.iter().any(|net| net.contains(&ip))
    }

    /// Check a textual candidate. Unparseable candidates never match.
    pub fn matches(&self, candidate: &str) -> bool {
        match candidate.trim().parse::<IpAddr>() {
            Ok(ip) => self.contains_ip(&ip),
            Err(_) => false,
        }
    }
}

/// Read and validate entries from a `#`-commented file.
///
/// # Errors
///
/// Returns [`GateError::Io`] if the file cannot be read, or
/// [`GateError::InvalidEntryAtLine`] naming the 1-based line of the first
/// invalid entry.
pub fn read_entries_file(path: &Path) -> GateResult<Vec<NetworkEntry>> {
    let content = std::fs::read_to_string(path).map_err(|e| GateError::io(path, e))?;

    let mut entries = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let Some(entry) = strip_comment(line) else {
            continue;
        };
        let parsed = NetworkEntry::parse(entry).map_err(|e| e.at_line(path, index + 1))?;
        entries.push(parsed);
    }

    Ok(entries)
}

/// Trim a line and drop `#` comments. Returns `None` for lines with no
/// content left.
pub(crate) fn strip_comment(line: &str) -> Option<&str> {
    let line = line.trim();
    let content = match line.find('#') {
        Some(index) => line.get(..index).unwrap_or_default().trim(),
        None => line,
    };
    (!content.is_empty()).then_some(content)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::Write;

    use super::*;

    fn set(entries: &[&str]) -> NetworkAllowSet {
        NetworkAllowSet::classify(entries).unwrap()
    }

    #[test]
    fn test_parse_individual_addresses() {
        let v4 = NetworkEntry::parse("192.168.1.1").unwrap();
        assert_eq!(v4.family(), AddressFamily::V4);

        let v6 = NetworkEntry::parse("  2001:db8::1 ").unwrap();
        assert_eq!(v6.family(), AddressFamily::V6);
    }

    #[test]
    fn test_parse_cidr_with_host_bits() {
        let entry = NetworkEntry::parse("10.1.2.3/8").unwrap();
        assert_eq!(entry, NetworkEntry::Range("10.0.0.0/8".parse().unwrap()));
    }

    #[test]
    fn test_parse_invalid_entries() {
        assert!(matches!(
            NetworkEntry::parse("not-an-ip"),
            Err(GateError::InvalidAddress { .. })
        ));
        assert!(matches!(
            NetworkEntry::parse("10.0.0.0/33"),
            Err(GateError::InvalidCidr { .. })
        ));
        assert!(matches!(
            NetworkEntry::parse("256.0.0.1"),
            Err(GateError::InvalidAddress { .. })
        ));
        assert!(NetworkEntry::parse("").is_err());
    }

    #[test]
    fn test_classify_is_atomic() {
        let result = NetworkAllowSet::classify(["10.0.0.0/8", "bogus", "192.168.1.1"]);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("'bogus'"));
    }

    #[test]
    fn test_matches_literal_and_range() {
        let allow = set(&["10.0.0.0/8", "192.168.1.100"]);

        assert!(allow.matches("10.1.2.3"));
        assert!(allow.matches("10.255.255.255"));
        assert!(allow.matches("192.168.1.100"));
        assert!(!allow.matches("192.168.1.1"));
        assert!(!allow.matches("11.0.0.1"));
    }

    #[test]
    fn test_matches_ipv6() {
        let allow = set(&["2001:db8::/32", "::1"]);

        assert!(allow.matches("2001:db8:1234::5"));
        assert!(allow.matches("::1"));
        assert!(!allow.matches("2001:db9::1"));
        assert!(!allow.matches("127.0.0.1"));
    }

    #[test]
    fn test_matches_ipv4_mapped_ipv6() {
        let allow = set(&["10.0.0.0/8", "192.0.2.1"]);
        assert!(allow.matches("::ffff:10.1.2.3"));
        assert!(allow.matches("::ffff:192.0.2.1"));

        let mapped = set(&["::ffff:192.168.0.0/112"]);
        assert!(mapped.matches("192.168.4.4"));
    }

    #[test]
    fn test_unparseable_candidate_never_matches() {
        let allow = set(&["0.0.0.0/0", "::/0"]);
        assert!(!allow.matches("unknown"));
        assert!(!allow.matches(""));
        assert!(!allow.matches("10.0.0.1:8080"));
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let allow = NetworkAllowSet::default();
        assert!(allow.is_empty());
        assert!(!allow.matches("127.0.0.1"));
    }

    #[test]
    fn test_read_entries_file_with_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# Allowed networks").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "10.0.0.0/8").unwrap();
        writeln!(file, "   # indented comment").unwrap();
        writeln!(file, "203.0.113.7   # on-call laptop").unwrap();
        writeln!(file, "2001:db8::/32").unwrap();

        let entries = read_entries_file(file.path()).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[1].contains(&"203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn test_read_entries_file_reports_line_number() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# header").unwrap();
        writeln!(file, "10.0.0.1").unwrap();
        writeln!(file, "10.0.0.0/40").unwrap();

        let err = read_entries_file(file.path()).unwrap_err();
        match &err {
            GateError::InvalidEntryAtLine { line, .. } => assert_eq!(*line, 3),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("at line 3"));
    }

    #[test]
    fn test_read_entries_file_missing() {
        let err = read_entries_file(Path::new("/nonexistent/allowed_ips.txt")).unwrap_err();
        assert!(matches!(err, GateError::Io { .. }));
    }

    #[test]
    fn test_from_sources_merges_inline_and_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "172.16.0.0/12").unwrap();

        let allow =
            NetworkAllowSet::from_sources(&["192.168.1.1".to_string()], Some(file.path()))
                .unwrap();

        assert_eq!(allow.len(), 2);
        assert!(allow.matches("192.168.1.1"));
        assert!(allow.matches("172.20.0.5"));
    }

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("  10.0.0.1  "), Some("10.0.0.1"));
        assert_eq!(strip_comment("10.0.0.1 # note"), Some("10.0.0.1"));
        assert_eq!(strip_comment("# note"), None);
        assert_eq!(strip_comment("   "), None);
    }
}
