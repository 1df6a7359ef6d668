//! # Maintenance Gate
//!
//! An HTTP front door that switches a service into maintenance mode without
//! taking it down:
//!
//! - **Access control**: IP/CIDR allow-lists, Basic-Auth (bcrypt) users and
//!   bypass paths reach the upstream while everyone else is turned away
//! - **Proxy trust**: `X-Forwarded-For` / `X-Real-IP` believed only from
//!   configured proxies
//! - **Request retention**: denied requests can be held open for a window and
//!   forwarded the moment maintenance ends
//! - **Observability**: Request IDs, structured logging, Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        Gated listener            │       Admin listener     │
//! ├──────────────────────────────────┼──────────────────────────┤
//! │  Request ID → Trace → Gate       │  Request ID → Trace →    │
//! │                        │         │  API key auth            │
//! │                        ▼         │  /maintenance/{status,   │
//! │                 Upstream proxy   │   set}, /health          │
//! ├──────────────────────────────────┴──────────────────────────┤
//! │  MaintenanceGate (AccessPolicy + RetentionGate + Responder) │
//! ├─────────────────────────────────────────────────────────────┤
//! │  MaintenanceState (shared flag, toggle notification)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use maintenance_gate::{AppState, Config, MaintenanceGate, build_admin_router, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let gate = MaintenanceGate::provision(&config)?;
//!     let state = AppState::new(gate, config)?;
//!
//!     let gated = build_router(state.clone());
//!     let admin = build_admin_router(state);
//!
//!     // Serve both with `into_make_service_with_connect_info::<SocketAddr>()`...
//!     Ok(())
//! }
//! ```
//!
//! ## Toggling
//!
//! ```bash
//! curl -X POST http://127.0.0.1:3001/maintenance/set \
//!      -d '{"enabled": true, "request_retention_mode_timeout": 30}'
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod persistence;
pub mod routes;
pub mod state;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use gate::{GateError, MaintenanceGate};
pub use routes::{build_admin_router, build_router};
pub use state::AppState;
