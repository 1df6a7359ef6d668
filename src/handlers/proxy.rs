//! Upstream forwarding for requests the gate lets through.
//!
//! Every method and path on the gated listener ends up here. The request is
//! re-issued against `UPSTREAM_URL` with its path and query preserved, and
//! the upstream response is streamed back.
//!
//! # Headers
//!
//! - Hop-by-hop headers (and any named in `Connection`) are dropped both ways
//! - `Host` is set by the client for the upstream authority
//! - `X-Forwarded-For` is extended with the direct peer address
//!
//! # Limits
//!
//! - `MAX_REQUEST_BODY_SIZE` - request bodies are buffered up to this size
//! - `UPSTREAM_TIMEOUT_SECS` - whole-request timeout on the upstream call

use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Response, Uri, header};
use reqwest::Url;
use tracing::{debug, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::gate::proxy_trust::X_FORWARDED_FOR;
use crate::metrics;
use crate::state::AppState;

/// Headers meaningful only for a single transport-level connection.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Forward a request to the upstream and stream its response back.
#[instrument(skip(state, request), fields(method = %request.method(), path = %request.uri().path()))]
pub async fn forward(State(state): State<AppState>, request: Request) -> AppResult<Response<Body>> {
    let (parts, body) = request.into_parts();
    let limit = state.config.max_request_body_size;

    if declared_length(&parts.headers).is_some_and(|len| len > limit) {
        return Err(AppError::PayloadTooLarge(format!(
            "Content-Length exceeds {limit} bytes"
        )));
    }

    let body = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| AppError::PayloadTooLarge(format!("Failed to buffer request body: {e}")))?;

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let mut headers = strip_hop_by_hop(&parts.headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    if let Some(ip) = peer {
        append_forwarded_for(&mut headers, &ip.to_string());
    }

    let url = upstream_url(&state.upstream, &parts.uri);
    debug!(url = %url, "Forwarding request upstream");

    let started = Instant::now();
    let result = state
        .http_client
        .request(parts.method, url)
        .headers(headers)
        .body(body)
        .send()
        .await;
    let elapsed = started.elapsed().as_secs_f64();

    let upstream = match result {
        Ok(upstream) => upstream,
        Err(e) if e.is_timeout() => {
            metrics::record_upstream_duration("timeout", elapsed);
            return Err(AppError::UpstreamTimeout(e.to_string()));
        }
        Err(e) => {
            metrics::record_upstream_duration("error", elapsed);
            warn!(error = %e, "Upstream request failed");
            return Err(AppError::UpstreamError(e.to_string()));
        }
    };

    let status = upstream.status();
    metrics::record_upstream_duration(status.as_str(), elapsed);

    let mut response = Response::builder().status(status);
    if let Some(response_headers) = response.headers_mut() {
        *response_headers = strip_hop_by_hop(upstream.headers());
    }

    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| AppError::Internal(format!("Failed to build proxied response: {e}")))
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Join the upstream base path with the request path and carry the query.
fn upstream_url(base: &Url, uri: &Uri) -> Url {
    let mut url = base.clone();
    let base_path = base.path().trim_end_matches('/');
    url.set_path(&format!("{base_path}{}", uri.path()));
    url.set_query(uri.query());
    url
}

/// Copy `headers` without hop-by-hop fields or fields listed in `Connection`.
fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || listed.contains(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Append `peer` to an existing `X-Forwarded-For` chain, or start one.
fn append_forwarded_for(headers: &mut HeaderMap, peer: &str) {
    let chain = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}, {peer}"),
        _ => peer.to_string(),
    };

    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
