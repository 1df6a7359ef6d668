//! HTTP middleware for the gated and admin listeners.
//!
//! - **Maintenance gate**: holds, forwards, or answers each gated request
//! - **Admin API key authentication**: constant-time comparison with
//!   brute force throttling
//!
//! Request IDs and tracing come from `tower_http` and are wired in
//! [`crate::routes`].
//!
//! # Architecture
//!
//! ```text
//! Gated:  Request → Request ID → Trace → Maintenance gate → Upstream proxy
//!                                              ↓
//!                                   hold / 503 / 401 + Retry-After
//!
//! Admin:  Request → Request ID → Trace → API key auth → Handler
//!                                              ↓
//!                                      401 / 429 Too Many
//! ```

pub mod auth;
pub mod maintenance;

pub use auth::{API_KEY_HEADER, AdminKeyAuth};
pub use maintenance::{MaintenanceLayer, MaintenanceService};
