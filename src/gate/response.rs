//! The maintenance response.
//!
//! Always carries `Retry-After`. Status is `401` with a Basic challenge when
//! credentials can grant access, `503` otherwise. The body is JSON when the
//! request's `Accept` or `Content-Type` is exactly `application/json`, HTML
//! otherwise.

use axum::Json;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Built-in maintenance page, used when no template file is configured.
pub const DEFAULT_TEMPLATE: &str = include_str!("../../templates/maintenance.html");

pub const DEFAULT_RETRY_AFTER_SECS: u64 = 300;

pub const DEFAULT_REALM: &str = "Maintenance Mode";

pub const MAINTENANCE_MESSAGE: &str = "Service temporarily unavailable for maintenance";

const JSON_MEDIA_TYPE: &str = "application/json";

#[derive(Debug, Serialize)]
struct MaintenanceBody {
    status: &'static str,
    message: &'static str,
}

/// `true` if the client asked for or sent JSON.
pub fn wants_json(headers: &HeaderMap) -> bool {
    [header::ACCEPT, header::CONTENT_TYPE]
        .iter()
        .any(|name| headers.get(name).is_some_and(|v| v == JSON_MEDIA_TYPE))
}

/// Builds maintenance responses from provisioned settings.
#[derive(Debug, Clone)]
pub struct MaintenanceResponder {
    retry_after: HeaderValue,
    challenge: Option<HeaderValue>,
    template: Bytes,
}

impl Default for MaintenanceResponder {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_AFTER_SECS, None, None)
    }
}

impl MaintenanceResponder {
    /// `realm` is `Some` only when credentials are configured. It must not
    /// contain control characters; quotes and backslashes are escaped.
    pub fn new(retry_after_secs: u64, realm: Option<&str>, template: Option<String>) -> Self {
        let retry_after_secs = if retry_after_secs == 0 {
            DEFAULT_RETRY_AFTER_SECS
        } else {
            retry_after_secs
        };

        Self {
            retry_after: HeaderValue::from(retry_after_secs),
            challenge: realm.and_then(basic_challenge),
            template: template
                .map(Bytes::from)
                .unwrap_or_else(|| Bytes::from_static(DEFAULT_TEMPLATE.as_bytes())),
        }
    }

    pub fn status(&self) -> StatusCode {
        if self.challenge.is_some() {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }

    pub fn respond(&self, request_headers: &HeaderMap) -> Response<Body> {
        let mut response = if wants_json(request_headers) {
            Json(MaintenanceBody {
                status: "error",
                message: MAINTENANCE_MESSAGE,
            })
            .into_response()
        } else {
            (
                [(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))],
                self.template.clone(),
            )
                .into_response()
        };

        *response.status_mut() = self.status();
        let headers = response.headers_mut();
        headers.insert(header::RETRY_AFTER, self.retry_after.clone());
        if let Some(challenge) = &self.challenge {
            headers.insert(header::WWW_AUTHENTICATE, challenge.clone());
        }

        response
    }
}

fn basic_challenge(realm: &str) -> Option<HeaderValue> {
    let realm = if realm.is_empty() { DEFAULT_REALM } else { realm };
    let escaped = realm.replace('\\', "\\\\").replace('"', "\\\"");
    HeaderValue::from_str(&format!("Basic realm=\"{escaped}\"")).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn body_string(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn json_headers(name: header::HeaderName) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn test_wants_json() {
        assert!(wants_json(&json_headers(header::ACCEPT)));
        assert!(wants_json(&json_headers(header::CONTENT_TYPE)));

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json, text/html"));
        assert!(!wants_json(&headers));
        assert!(!wants_json(&HeaderMap::new()));
    }

    #[tokio::test]
    async fn test_html_503_without_credentials() {
        let responder = MaintenanceResponder::default();
        let response = responder.respond(&HeaderMap::new());

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "300");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());

        let body = body_string(response).await;
        assert!(body.contains("noindex"));
    }

    #[tokio::test]
    async fn test_json_body() {
        let responder = MaintenanceResponder::new(120, None, None);
        let response = responder.respond(&json_headers(header::ACCEPT));

        assert_eq!(response.headers()[header::RETRY_AFTER], "120");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], MAINTENANCE_MESSAGE);
    }

    #[tokio::test]
    async fn test_401_challenge_with_realm() {
        let responder = MaintenanceResponder::new(60, Some("Staging \"B\""), None);
        let response = responder.respond(&HeaderMap::new());

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            r#"Basic realm="Staging \"B\"""#
        );
    }

    #[test]
    fn test_empty_realm_uses_default() {
        let responder = MaintenanceResponder::new(60, Some(""), None);
        let response = responder.respond(&HeaderMap::new());
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Basic realm=\"Maintenance Mode\""
        );
    }

    #[tokio::test]
    async fn test_custom_template() {
        let responder =
            MaintenanceResponder::new(10, None, Some("<p>back at noon</p>".to_string()));
        let body = body_string(responder.respond(&HeaderMap::new())).await;
        assert_eq!(body, "<p>back at noon</p>");
    }

    #[test]
    fn test_zero_retry_after_uses_default() {
        let responder = MaintenanceResponder::new(0, None, None);
        let response = responder.respond(&HeaderMap::new());
        assert_eq!(response.headers()[header::RETRY_AFTER], "300");
    }
}
