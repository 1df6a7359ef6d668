//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Maintenance Gate
//!
//! - `MAINTENANCE_DEFAULT_ENABLED`: Startup state when no status file is readable
//! - `MAINTENANCE_ALLOWED_IPS` / `MAINTENANCE_ALLOWED_IPS_FILE`: Addresses and CIDRs that bypass maintenance
//! - `MAINTENANCE_HTPASSWD_FILE`: Basic-Auth users (bcrypt) that bypass maintenance
//! - `MAINTENANCE_RETENTION_TIMEOUT_SECS`: Hold denied requests up to this long (unset = respond immediately)
//!
//! # Security Configuration
//!
//! - `ADMIN_API_KEY`: When set, the admin API requires `X-API-Key` on every endpoint except `/health`
//! - `MAINTENANCE_USE_FORWARDED_HEADERS` + `MAINTENANCE_TRUSTED_PROXIES`: Believe
//!   `X-Forwarded-For` / `X-Real-IP` only from these peers

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Gate will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Gated listener host (default: "0.0.0.0")
    pub host: String,

    /// Gated listener port (default: 3000)
    pub port: u16,

    /// Admin API host (default: "127.0.0.1")
    pub admin_host: String,

    /// Admin API port (default: 3001)
    pub admin_port: u16,

    // =========================================================================
    // Upstream Configuration
    // =========================================================================
    /// Where forwarded requests go (default: "http://127.0.0.1:8080")
    pub upstream_url: String,

    /// Per-request upstream timeout (default: 30 seconds)
    pub upstream_timeout: Duration,

    /// Maximum forwarded request body size in bytes (default: 10MB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Maintenance State Configuration
    // =========================================================================
    /// Maintenance state used when no status file is readable (default: false)
    pub default_enabled: bool,

    /// Where the admin API persists `{"enabled": ...}` across restarts
    pub status_file: Option<PathBuf>,

    /// Custom HTML maintenance page
    pub template_file: Option<PathBuf>,

    /// `Retry-After` value on maintenance responses (default: 300)
    pub retry_after_secs: u64,

    /// How long denied requests are held open. `None` = respond immediately.
    pub retention_timeout_secs: Option<u64>,

    /// How often held requests re-check the state (default: 1 second)
    pub poll_interval: Duration,

    // =========================================================================
    // Access Configuration
    // =========================================================================
    /// Inline IPs/CIDRs that bypass maintenance
    pub allowed_ips: Vec<String>,

    /// File of IPs/CIDRs, one per line, `#` comments
    pub allowed_ips_file: Option<PathBuf>,

    /// Believe forwarding headers from trusted proxies (default: false)
    pub use_forwarded_headers: bool,

    /// Trusted proxy IPs/CIDRs.
    ///
    /// Format: Comma-separated (e.g., "10.0.0.0/8,172.16.0.0/12").
    /// Required when `use_forwarded_headers` is on.
    pub trusted_proxies: Vec<String>,

    /// htpasswd-style file of `user:bcrypt-hash` lines
    pub htpasswd_file: Option<PathBuf>,

    /// Basic-Auth realm (default: "Maintenance Mode")
    pub auth_realm: String,

    /// Paths that bypass maintenance entirely (exact or `/prefix/*`)
    pub bypass_paths: Vec<String>,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// API key for the admin API (optional - when set, required via `X-API-Key`)
    pub admin_api_key: Option<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value fails to parse or
    /// validation fails.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or(defaults.host),
            port: Self::parse_env("PORT", defaults.port)?,
            admin_host: env::var("ADMIN_HOST").unwrap_or(defaults.admin_host),
            admin_port: Self::parse_env("ADMIN_PORT", defaults.admin_port)?,

            // Upstream
            upstream_url: env::var("UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            upstream_timeout: Duration::from_secs(Self::parse_env("UPSTREAM_TIMEOUT_SECS", 30)?),
            max_request_body_size: Self::parse_env(
                "MAX_REQUEST_BODY_SIZE",
                defaults.max_request_body_size,
            )?,

            // Maintenance state
            default_enabled: Self::parse_env("MAINTENANCE_DEFAULT_ENABLED", false)?,
            status_file: Self::parse_path("MAINTENANCE_STATUS_FILE"),
            template_file: Self::parse_path("MAINTENANCE_TEMPLATE_FILE"),
            retry_after_secs: Self::parse_env(
                "MAINTENANCE_RETRY_AFTER_SECS",
                defaults.retry_after_secs,
            )?,
            retention_timeout_secs: Self::parse_optional_env("MAINTENANCE_RETENTION_TIMEOUT_SECS")?,
            poll_interval: Duration::from_millis(Self::parse_env(
                "MAINTENANCE_POLL_INTERVAL_MS",
                1000,
            )?),

            // Access
            allowed_ips: Self::parse_list("MAINTENANCE_ALLOWED_IPS"),
            allowed_ips_file: Self::parse_path("MAINTENANCE_ALLOWED_IPS_FILE"),
            use_forwarded_headers: Self::parse_env("MAINTENANCE_USE_FORWARDED_HEADERS", false)?,
            trusted_proxies: Self::parse_list("MAINTENANCE_TRUSTED_PROXIES"),
            htpasswd_file: Self::parse_path("MAINTENANCE_HTPASSWD_FILE"),
            auth_realm: env::var("MAINTENANCE_AUTH_REALM")
                .ok()
                .filter(|r| !r.is_empty())
                .unwrap_or(defaults.auth_realm),
            bypass_paths: Self::parse_list("MAINTENANCE_BYPASS_PATHS"),

            // Security
            admin_api_key: env::var("ADMIN_API_KEY").ok().filter(|k| !k.is_empty()),

            // Observability
            metrics_port: Self::parse_env("METRICS_PORT", defaults.metrics_port)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        let upstream = reqwest::Url::parse(&self.upstream_url).map_err(|e| {
            AppError::ConfigError(format!("Invalid UPSTREAM_URL '{}': {e}", self.upstream_url))
        })?;
        if !matches!(upstream.scheme(), "http" | "https") {
            return Err(AppError::ConfigError(format!(
                "UPSTREAM_URL must use http or https, got '{}'",
                upstream.scheme()
            )));
        }

        if self.upstream_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "UPSTREAM_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.retry_after_secs == 0 {
            return Err(AppError::ConfigError(
                "MAINTENANCE_RETRY_AFTER_SECS must be greater than 0".to_string(),
            ));
        }

        if self.retention_timeout_secs == Some(0) {
            return Err(AppError::ConfigError(
                "MAINTENANCE_RETENTION_TIMEOUT_SECS must be greater than 0 when set".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(AppError::ConfigError(
                "MAINTENANCE_POLL_INTERVAL_MS must be greater than 0".to_string(),
            ));
        }

        if self.use_forwarded_headers && self.trusted_proxies.is_empty() {
            return Err(AppError::ConfigError(
                "MAINTENANCE_USE_FORWARDED_HEADERS requires MAINTENANCE_TRUSTED_PROXIES".to_string(),
            ));
        }

        if self.auth_realm.chars().any(|c| c.is_control() || c == '"') {
            return Err(AppError::ConfigError(
                "MAINTENANCE_AUTH_REALM must not contain control characters or '\"'".to_string(),
            ));
        }

        if let Some(path) = self.bypass_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(AppError::ConfigError(format!(
                "MAINTENANCE_BYPASS_PATHS entry '{path}' must start with '/'"
            )));
        }

        Ok(())
    }

    /// Get the gated listener address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the admin listener address for binding.
    pub fn admin_addr(&self) -> String {
        format!("{}:{}", self.admin_host, self.admin_port)
    }

    /// Check if admin API key authentication is enabled.
    pub fn admin_auth_enabled(&self) -> bool {
        self.admin_api_key.is_some()
    }

    /// Retention timeout as stored in the maintenance state (`0` = none).
    pub fn retention_timeout(&self) -> u64 {
        self.retention_timeout_secs.unwrap_or(0)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_enabled()
            .then(|| SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(Self::parse_optional_env(name)?.unwrap_or(default))
    }

    /// Parse an optional environment variable. Unset or empty is `None`.
    fn parse_optional_env<T>(name: &str) -> AppResult<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) if !val.trim().is_empty() => val
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            _ => Ok(None),
        }
    }

    fn parse_path(name: &str) -> Option<PathBuf> {
        env::var(name)
            .ok()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    /// Parse a comma-separated list, dropping empty entries.
    fn parse_list(name: &str) -> Vec<String> {
        env::var(name)
            .map(|s| split_list(&s))
            .unwrap_or_default()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            admin_host: "127.0.0.1".to_string(),
            admin_port: 3001,
            // Upstream
            upstream_url: "http://127.0.0.1:8080".to_string(),
            upstream_timeout: Duration::from_secs(30),
            max_request_body_size: 10 * 1024 * 1024, // 10MB
            // Maintenance state
            default_enabled: false,
            status_file: None,
            template_file: None,
            retry_after_secs: 300,
            retention_timeout_secs: None,
            poll_interval: Duration::from_secs(1),
            // Access
            allowed_ips: vec![],
            allowed_ips_file: None,
            use_forwarded_headers: false,
            trusted_proxies: vec![],
            htpasswd_file: None,
            auth_realm: "Maintenance Mode".to_string(),
            bypass_paths: vec![],
            // Security
            admin_api_key: None,
            // Observability
            metrics_port: 9090,
        }
    }
}
