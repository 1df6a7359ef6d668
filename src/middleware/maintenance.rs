//! Maintenance gate middleware.
//!
//! Runs every request through [`MaintenanceGate::evaluate`]. A request is
//! either passed to the inner service exactly once or answered with the
//! maintenance response exactly once; never both.
//!
//! The peer address comes from axum's `ConnectInfo<SocketAddr>` extension, so
//! the router must be served with
//! `into_make_service_with_connect_info::<SocketAddr>()`. Without it the peer
//! is unknown and never matches an allow-list entry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response};
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};

use crate::gate::{MaintenanceGate, RequestFacts, Resolution};

/// Tower layer wrapping services with the maintenance gate.
#[derive(Clone)]
pub struct MaintenanceLayer {
    gate: Arc<MaintenanceGate>,
    shutdown: CancellationToken,
}

impl MaintenanceLayer {
    /// `shutdown` releases held requests into the maintenance response when
    /// cancelled.
    pub fn new(gate: Arc<MaintenanceGate>, shutdown: CancellationToken) -> Self {
        Self { gate, shutdown }
    }
}

impl<S> Layer<S> for MaintenanceLayer {
    type Service = MaintenanceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MaintenanceService {
            inner,
            gate: self.gate.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Maintenance gate service wrapper.
#[derive(Clone)]
pub struct MaintenanceService<S> {
    inner: S,
    gate: Arc<MaintenanceGate>,
    shutdown: CancellationToken,
}

impl<S> Service<Request<Body>> for MaintenanceService<S>
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
        let gate = self.gate.clone();
        let shutdown = self.shutdown.clone();
        // Take the service that was driven to readiness, leave a fresh clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            // Split so the body isn't borrowed across the hold.
            let (parts, body) = req.into_parts();

            let peer = parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.to_string())
                .unwrap_or_default();

            let resolution = gate
                .evaluate(
                    &RequestFacts {
                        path: parts.uri.path(),
                        peer: &peer,
                        headers: &parts.headers,
                    },
                    &shutdown,
                )
                .await;

            match resolution {
                Resolution::Forward => inner.call(Request::from_parts(parts, body)).await,
                Resolution::MaintenanceResponse => Ok(gate.maintenance_response(&parts.headers)),
            }
        })
    }
}
