//! Prometheus metrics for the maintenance gate.
//!
//! Metrics are exposed via a dedicated HTTP listener (default: `0.0.0.0:9090`).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `maintenance_requests_total` - Gate outcomes (label: outcome)
//! - `maintenance_toggles_total` - Admin toggles (label: enabled)
//!
//! ## Histograms
//! - `maintenance_hold_duration_seconds` - Time spent held (label: exit)
//! - `maintenance_upstream_duration_seconds` - Upstream round trip (label: status)
//!
//! ## Gauges
//! - `maintenance_enabled` - Current mode (1 = maintenance, 0 = normal)
//! - `maintenance_held_requests` - Requests currently held open
//!
//! # Usage
//!
//! ```rust,ignore
//! use maintenance_gate::metrics::{try_init_metrics, record_gate_outcome};
//!
//! try_init_metrics("0.0.0.0:9090".parse()?);
//! record_gate_outcome("passthrough");
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "maintenance_requests_total";
    pub const TOGGLES_TOTAL: &str = "maintenance_toggles_total";
    pub const HOLD_DURATION_SECONDS: &str = "maintenance_hold_duration_seconds";
    pub const UPSTREAM_DURATION_SECONDS: &str = "maintenance_upstream_duration_seconds";
    pub const ENABLED: &str = "maintenance_enabled";
    pub const HELD_REQUESTS: &str = "maintenance_held_requests";
}

/// Initialize the Prometheus metrics exporter.
///
/// Installs the global recorder, starts the HTTP listener on `metrics_addr`
/// and registers metric descriptions.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::REQUESTS_TOTAL,
        "Requests seen by the maintenance gate, by outcome"
    );
    describe_counter!(
        names::TOGGLES_TOTAL,
        "Maintenance mode changes applied through the admin API"
    );

    describe_histogram!(
        names::HOLD_DURATION_SECONDS,
        "Time a denied request was held open before release, timeout or cancellation"
    );
    describe_histogram!(
        names::UPSTREAM_DURATION_SECONDS,
        "Upstream request duration in seconds"
    );

    describe_gauge!(
        names::ENABLED,
        "Maintenance mode (1 = enabled, 0 = disabled)"
    );
    describe_gauge!(
        names::HELD_REQUESTS,
        "Requests currently held open in retention mode"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counter Recording Functions
// =============================================================================

/// Record the final outcome of one gated request.
pub fn record_gate_outcome(outcome: &'static str) {
    counter!(names::REQUESTS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record an applied maintenance toggle.
pub fn record_toggle(enabled: bool) {
    counter!(names::TOGGLES_TOTAL, "enabled" => enabled.to_string()).increment(1);
}

// =============================================================================
// Histogram Recording Functions
// =============================================================================

/// Record how long a request was held and how the hold ended.
pub fn record_hold_duration(exit: &'static str, duration_secs: f64) {
    histogram!(names::HOLD_DURATION_SECONDS, "exit" => exit).record(duration_secs);
}

/// Record an upstream round trip.
pub fn record_upstream_duration(status: &str, duration_secs: f64) {
    histogram!(names::UPSTREAM_DURATION_SECONDS, "status" => status.to_string())
        .record(duration_secs);
}

// =============================================================================
// Gauge Recording Functions
// =============================================================================

/// Update maintenance mode gauge.
pub fn set_maintenance_enabled(enabled: bool) {
    gauge!(names::ENABLED).set(if enabled { 1.0 } else { 0.0 });
}

pub fn increment_held_requests() {
    gauge!(names::HELD_REQUESTS).increment(1.0);
}

pub fn decrement_held_requests() {
    gauge!(names::HELD_REQUESTS).decrement(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These only check that recording without an installed recorder is a no-op.

    #[test]
    fn test_record_gate_outcome() {
        record_gate_outcome("passthrough");
        record_gate_outcome("maintenance");
    }

    #[test]
    fn test_record_toggle() {
        record_toggle(true);
        record_toggle(false);
    }

    #[test]
    fn test_record_durations() {
        record_hold_duration("released", 1.5);
        record_upstream_duration("200", 0.02);
    }

    #[test]
    fn test_gauges() {
        set_maintenance_enabled(true);
        set_maintenance_enabled(false);
        increment_held_requests();
        decrement_held_requests();
    }
}
