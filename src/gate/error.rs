//! Provisioning errors for the maintenance gate.
//!
//! Everything here is a configuration problem: the gate refuses to start
//! rather than run with a partially parsed allow-list or credential table.
//! Runtime classification failures never surface as errors; they resolve to
//! the conservative outcome inside the gate itself.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building the gate from configuration.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("invalid IP address '{entry}'")]
    InvalidAddress { entry: String },

    #[error("invalid CIDR notation '{entry}': {reason}")]
    InvalidCidr { entry: String, reason: String },

    #[error("{source} at line {line} of '{}'", .path.display())]
    InvalidEntryAtLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: Box<GateError>,
    },

    #[error("use_forwarded_headers requires at least one trusted proxy")]
    NoTrustedProxies,

    #[error("invalid credential file format at line {line}: expected 'username:password_hash'")]
    MissingSeparator { line: usize },

    #[error("empty username at line {line}")]
    EmptyUsername { line: usize },

    #[error("empty password hash at line {line}")]
    EmptyHash { line: usize },

    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl GateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn at_line(self, path: impl Into<PathBuf>, line: usize) -> Self {
        Self::InvalidEntryAtLine {
            path: path.into(),
            line,
            source: Box::new(self),
        }
    }
}

/// Convenience type alias for gate provisioning results.
pub type GateResult<T> = Result<T, GateError>;
