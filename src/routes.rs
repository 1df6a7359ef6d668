//! Application routing configuration with middleware stack.
//!
//! The process serves two routers on separate listeners.
//!
//! # Gated Router (applied in order)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← Sets and propagates X-Request-Id
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ Maintenance gate │ ← hold, then 503/401 if denied
//! └────────┬─────────┘
//!          │
//!          ▼
//!   Upstream proxy (every method and path)
//! ```
//!
//! # Admin Router
//!
//! Request ID → Tracing → API key auth (bypassed for `/health`) → Handler
//!
//! - `GET /health` - Gate process health
//! - `GET /maintenance/status` - Current maintenance state
//! - `POST /maintenance/set` - Switch maintenance mode

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::{AdminKeyAuth, MaintenanceLayer};
use crate::state::AppState;

/// Admin request bodies are tiny JSON documents.
const ADMIN_BODY_LIMIT: usize = 64 * 1024;

/// Build the gated router: every request passes the maintenance gate and,
/// if let through, is forwarded upstream.
///
/// Serve with `into_make_service_with_connect_info::<SocketAddr>()`; the gate
/// reads the peer address from `ConnectInfo`.
pub fn build_router(state: AppState) -> Router {
    let gate = MaintenanceLayer::new(state.gate.clone(), state.shutdown_token());

    info!(
        upstream = %state.upstream,
        max_body_size_mb = state.config.max_request_body_size / (1024 * 1024),
        "Gated router configured"
    );

    Router::new()
        .fallback(handlers::forward)
        .layer(gate)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Build the admin router.
///
/// Serve with `into_make_service_with_connect_info::<SocketAddr>()`; failed
/// key attempts are throttled per peer address.
pub fn build_admin_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/maintenance/status", get(handlers::get_status))
        .route("/maintenance/set", post(handlers::set_status))
        .layer(DefaultBodyLimit::max(ADMIN_BODY_LIMIT));

    let auth_layer = AdminKeyAuth::with_defaults(state.config.admin_api_key.clone());
    if auth_layer.is_enabled() {
        info!("Admin API key authentication enabled");
        router = router.layer(auth_layer);
    } else {
        info!("Admin API key authentication disabled (no ADMIN_API_KEY set)");
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::gate::MaintenanceGate;
    use crate::middleware::API_KEY_HEADER;

    fn app_state(config: Config) -> AppState {
        let gate = MaintenanceGate::provision(&config).unwrap();
        AppState::new(gate, config).unwrap()
    }

    #[tokio::test]
    async fn test_gated_router_denies_in_maintenance() {
        let router = build_router(app_state(Config {
            default_enabled: true,
            ..Config::default()
        }));

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/anything")
                    .header(header::ACCEPT, "application/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "300");
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_admin_status_and_method_not_allowed() {
        let router = build_admin_router(app_state(Config::default()));

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/maintenance/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/maintenance/set")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_admin_key_guards_everything_but_health() {
        let router = build_admin_router(app_state(Config {
            admin_api_key: Some("secret".to_string()),
            ..Config::default()
        }));

        let health = router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let denied = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/maintenance/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = router
            .oneshot(
                Request::builder()
                    .uri("/maintenance/status")
                    .header(API_KEY_HEADER, "secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_set_toggles_gate() {
        let state = app_state(Config::default());
        let router = build_admin_router(state.clone());

        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/maintenance/set")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"enabled":true,"request_retention_mode_timeout":5}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let snapshot = state.gate.state().snapshot();
        assert!(snapshot.enabled);
        assert_eq!(snapshot.retention_timeout_secs, 5);
    }
}
