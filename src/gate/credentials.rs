//! Basic-Auth credential table loaded from an htpasswd-style file.
//!
//! Each line is `username:hash`. Only bcrypt hashes verify; the other
//! htpasswd formats are recognised so they can be rejected explicitly.
//! Verification never errors: every failure mode is "not authenticated".

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info, warn};

use super::address::strip_comment;
use super::error::{GateError, GateResult};

/// Password hash formats found in htpasswd files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashScheme {
    /// `$2a$`, `$2b$`, `$2y$` - the only scheme that verifies.
    Bcrypt,
    /// `$apr1$` (Apache MD5).
    Apr1,
    /// `$1$` (MD5-crypt).
    Md5Crypt,
    /// `$5$` (SHA-256-crypt).
    Sha256Crypt,
    /// `$6$` (SHA-512-crypt).
    Sha512Crypt,
    /// `{SHA}` (unsalted SHA-1).
    Sha1,
    /// Anything else, including plain text.
    Unsupported,
}

impl HashScheme {
    pub fn detect(hash: &str) -> Self {
        const PREFIXES: &[(&str, HashScheme)] = &[
            ("$2a$", HashScheme::Bcrypt),
            ("$2b$", HashScheme::Bcrypt),
            ("$2y$", HashScheme::Bcrypt),
            ("$apr1$", HashScheme::Apr1),
            ("$1$", HashScheme::Md5Crypt),
            ("$5$", HashScheme::Sha256Crypt),
            ("$6$", HashScheme::Sha512Crypt),
            ("{SHA}", HashScheme::Sha1),
        ];

        PREFIXES
            .iter()
            .find(|(prefix, _)| hash.starts_with(prefix))
            .map_or(Self::Unsupported, |(_, scheme)| *scheme)
    }

    pub fn is_supported(self) -> bool {
        matches!(self, Self::Bcrypt)
    }
}

/// Username to password hash mapping.
#[derive(Clone, Default)]
pub struct CredentialTable {
    entries: HashMap<String, String>,
}

impl fmt::Debug for CredentialTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialTable")
            .field("users", &self.entries.len())
            .finish()
    }
}

impl CredentialTable {
    /// Load a table from an htpasswd file.
    pub fn load(path: &Path) -> GateResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| GateError::io(path, e))?;
        let table = Self::parse(&content)?;

        info!(
            path = %path.display(),
            users = table.len(),
            "Credential file loaded"
        );

        Ok(table)
    }

    /// Parse htpasswd content. Line numbers in errors are 1-based.
    pub fn parse(content: &str) -> GateResult<Self> {
        let mut entries = HashMap::new();

        for (index, line) in content.lines().enumerate() {
            let line_no = index + 1;
            let Some(line) = strip_comment(line) else {
                continue;
            };

            let (username, hash) = line
                .split_once(':')
                .ok_or(GateError::MissingSeparator { line: line_no })?;
            let (username, hash) = (username.trim(), hash.trim());

            if username.is_empty() {
                return Err(GateError::EmptyUsername { line: line_no });
            }
            if hash.is_empty() {
                return Err(GateError::EmptyHash { line: line_no });
            }

            let scheme = HashScheme::detect(hash);
            if !scheme.is_supported() {
                warn!(
                    username = username,
                    line = line_no,
                    ?scheme,
                    "Unsupported password hash scheme, user will never authenticate"
                );
            }

            if entries.insert(username.to_string(), hash.to_string()).is_some() {
                warn!(
                    username = username,
                    line = line_no,
                    "Duplicate user in credential file, later entry wins"
                );
            }
        }

        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains_user(&self, username: &str) -> bool {
        self.entries.contains_key(username)
    }

    /// Check a password for a user. Unknown users and unsupported schemes
    /// fail closed.
    ///
    /// This runs the bcrypt work factor and blocks; call it from a blocking
    /// context in async code.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let Some(stored) = self.entries.get(username) else {
            debug!(username = username, "User not found in credential table");
            return false;
        };

        match HashScheme::detect(stored) {
            HashScheme::Bcrypt => bcrypt::verify(password, stored).unwrap_or(false),
            scheme => {
                debug!(username = username, ?scheme, "Rejecting unsupported hash scheme");
                false
            }
        }
    }
}

/// Decoded `Authorization: Basic ...` credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl BasicCredentials {
    /// Decode an `Authorization` header value. Anything that isn't a well
    /// formed Basic credential yields `None`.
    pub fn from_header(value: &str) -> Option<Self> {
        let encoded = value.strip_prefix("Basic ")?;
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;

        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}
