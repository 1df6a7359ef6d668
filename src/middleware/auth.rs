//! Admin API key authentication middleware.
//!
//! # Security Features
//!
//! - **Constant-time comparison**: Prevents timing attacks on key validation
//! - **Header only**: The key is read from `X-API-Key`, never from the URL
//! - **Brute force throttling**: Per-peer limit on failed attempts
//! - **Selective protection**: `/health` bypassed for monitoring
//!
//! # Usage
//!
//! ```bash
//! ADMIN_API_KEY=your-secret-key maintenance_gate
//! curl -H "X-API-Key: your-secret-key" http://127.0.0.1:3001/maintenance/status
//! ```
//!
//! Failures are tracked per direct peer address. The admin listener sits
//! outside the gate's proxy trust, so forwarding headers are ignored here.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response, StatusCode, header};
use axum::response::IntoResponse;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};
use tracing::{debug, error, warn};

/// Header name for the admin API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Paths that bypass authentication (exact match).
const DEFAULT_BYPASS_PATHS: [&str; 1] = ["/health"];

/// Failed attempts per peer per minute before blocking.
const DEFAULT_AUTH_FAILURE_LIMIT: NonZeroU32 = NonZeroU32::new(10).unwrap();

/// Burst capacity for auth failure rate limiting.
const DEFAULT_AUTH_FAILURE_BURST: NonZeroU32 = NonZeroU32::new(5).unwrap();

/// Key used when the peer address is unavailable.
const UNKNOWN_PEER: &str = "unknown";

/// Type alias for auth failure rate limiter (per peer).
type AuthFailureLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Admin API key authentication layer.
///
/// When the expected key is `None`, all requests are allowed (auth disabled).
#[derive(Clone)]
pub struct AdminKeyAuth {
    expected_key: Option<Arc<String>>,
    bypass_paths: Arc<Vec<String>>,
    failure_limiter: Option<Arc<AuthFailureLimiter>>,
}

impl AdminKeyAuth {
    pub fn new(api_key: Option<String>, bypass_paths: Vec<String>) -> Self {
        // Only track failures when auth is enabled
        let failure_limiter = api_key.as_ref().map(|_| {
            let quota = Quota::per_minute(DEFAULT_AUTH_FAILURE_LIMIT)
                .allow_burst(DEFAULT_AUTH_FAILURE_BURST);
            Arc::new(RateLimiter::keyed(quota))
        });

        Self {
            expected_key: api_key.map(Arc::new),
            bypass_paths: Arc::new(bypass_paths),
            failure_limiter,
        }
    }

    /// Create with the default bypass path (`/health`).
    pub fn with_defaults(api_key: Option<String>) -> Self {
        Self::new(
            api_key,
            DEFAULT_BYPASS_PATHS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.expected_key.is_some()
    }
}

impl<S> Layer<S> for AdminKeyAuth {
    type Service = AdminKeyAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdminKeyAuthService {
            inner,
            expected_key: self.expected_key.clone(),
            bypass_paths: self.bypass_paths.clone(),
            failure_limiter: self.failure_limiter.clone(),
        }
    }
}

/// Admin API key authentication service wrapper.
#[derive(Clone)]
pub struct AdminKeyAuthService<S> {
    inner: S,
    expected_key: Option<Arc<String>>,
    bypass_paths: Arc<Vec<String>>,
    failure_limiter: Option<Arc<AuthFailureLimiter>>,
}

impl<S> Service<Request<Body>> for AdminKeyAuthService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let expected_key = self.expected_key.clone();
        let bypass_paths = self.bypass_paths.clone();
        let failure_limiter = self.failure_limiter.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(expected) = expected_key else {
                return inner.call(req).await;
            };

            let path = req.uri().path();
            if bypass_paths.iter().any(|p| p == path) {
                debug!(path, "Bypassing admin auth");
                return inner.call(req).await;
            }

            let provided = req
                .headers()
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok());

            let message = match provided {
                Some(key) if constant_time_eq(key, &expected) => {
                    debug!("Admin API key accepted");
                    return inner.call(req).await;
                }
                Some(_) => "Invalid API key",
                None => "API key required",
            };

            let peer = peer_key(&req);

            // Only failures draw from the limiter
            if let Some(ref limiter) = failure_limiter
                && let Err(not_until) = limiter.check_key(&peer)
            {
                let retry_after = not_until
                    .wait_time_from(DefaultClock::default().now())
                    .as_secs()
                    .max(1);

                error!(
                    peer = %peer,
                    retry_after_secs = retry_after,
                    "Peer blocked due to excessive admin auth failures"
                );
                return Ok(rate_limited_response(retry_after));
            }

            warn!(path = %req.uri().path(), peer = %peer, "{message}");
            Ok(unauthorized_response(message))
        })
    }
}

fn peer_key<B>(req: &Request<B>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| UNKNOWN_PEER.to_string(), |ConnectInfo(addr)| addr.ip().to_string())
}

/// Perform constant-time comparison of two strings.
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Build an unauthorized (401) response.
fn unauthorized_response(message: &str) -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        [
            (header::WWW_AUTHENTICATE, "API-Key"),
            (header::CONTENT_TYPE, "application/json"),
        ],
        format!(r#"{{"error":"unauthorized","message":"{message}"}}"#),
    )
        .into_response()
}

/// Build a rate limited (429) response for auth failures.
fn rate_limited_response(retry_after: u64) -> Response<Body> {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            (header::RETRY_AFTER, retry_after.to_string()),
            (header::CONTENT_TYPE, "application/json".to_string()),
        ],
        r#"{"error":"too_many_requests","message":"Too many failed authentication attempts. Please wait before retrying."}"#,
    )
        .into_response()
}
