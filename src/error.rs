use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::gate::GateError;

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Upstream Errors
///
/// Failures talking to the upstream are split so clients can tell a dead
/// backend from a slow one:
///
/// - `UpstreamError` - connection refused, reset, or malformed response (502)
/// - `UpstreamTimeout` - no response within `UPSTREAM_TIMEOUT_SECS` (504)
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Upstream request failed: {0}")]
    UpstreamError(String),

    #[error("Upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Failed to persist maintenance status: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Gate configuration error: {0}")]
    Gate(#[from] GateError),
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full error details server-side for debugging
        // but only expose sanitized messages to clients
        tracing::error!(error = %self, "Request failed");

        let (status, error_type, message) = match &self {
            // Upstream availability - don't leak backend addresses
            AppError::UpstreamError(_) => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "The upstream service is unavailable. Please try again later.",
            ),
            AppError::UpstreamTimeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "upstream_timeout",
                "The upstream service did not respond in time. Please try again.",
            ),

            // Internal errors - never expose internal details to clients
            AppError::Persistence(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "persistence_error",
                "Failed to persist maintenance status. State was not changed.",
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred. Please contact support if the issue persists.",
            ),
            AppError::ConfigError(_) | AppError::Gate(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                "Service configuration error. Please contact support.",
            ),

            // Client errors - safe to show the message as it's user-facing
            AppError::SerializationError(e) => {
                // Serde errors can be helpful for clients debugging their payload
                // but sanitize to avoid leaking internal type names
                let sanitized = sanitize_serde_error(e);
                return (
                    StatusCode::BAD_REQUEST,
                    axum::Json(ErrorResponse {
                        error: "serialization_error".to_string(),
                        message: sanitized,
                        details: None,
                    }),
                )
                    .into_response();
            }
            AppError::PayloadTooLarge(_) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                "Request body exceeds the configured limit.",
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.as_str()),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: message.to_string(),
            details: None, // Never expose internal details to clients
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Sanitize serde error messages to avoid leaking internal type information.
fn sanitize_serde_error(e: &serde_json::Error) -> String {
    let msg = e.to_string();

    if msg.contains("missing field")
        && let Some(field) = backticked(&msg)
    {
        return format!("Missing required field: {field}");
    }

    if msg.contains("unknown field")
        && let Some(field) = backticked(&msg)
    {
        return format!("Unknown field: {field}");
    }

    if msg.contains("invalid type") {
        return "Invalid data type in request body".to_string();
    }

    if msg.contains("EOF while parsing") || msg.contains("expected") {
        return "Malformed JSON in request body".to_string();
    }

    // Generic fallback that doesn't leak internal details
    "Invalid request format".to_string()
}

/// First `` `quoted` `` segment of a serde message.
fn backticked(msg: &str) -> Option<&str> {
    let (_, rest) = msg.split_once('`')?;
    let (field, _) = rest.split_once('`')?;
    Some(field)
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_upstream_errors_do_not_leak_details() {
        let response =
            AppError::UpstreamError("connect to 10.0.0.5:8080 refused".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "upstream_error");
        assert!(!body.to_string().contains("10.0.0.5"));

        let response = AppError::UpstreamTimeout("30s".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_persistence_error_is_500() {
        let response = AppError::Persistence("EACCES /var/lib/status".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "persistence_error");
        assert!(!body.to_string().contains("/var/lib"));
    }

    #[tokio::test]
    async fn test_serde_error_is_sanitized() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Toggle {
            enabled: bool,
        }

        let err = serde_json::from_str::<Toggle>("{}").unwrap_err();
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Missing required field: enabled");

        let err = serde_json::from_str::<Toggle>("{\"enabled\":").unwrap_err();
        assert_eq!(sanitize_serde_error(&err), "Malformed JSON in request body");

        let err = serde_json::from_str::<Toggle>("{\"enabled\":\"yes\"}").unwrap_err();
        assert_eq!(sanitize_serde_error(&err), "Invalid data type in request body");
    }

    #[test]
    fn test_gate_error_converts() {
        let err: AppError = GateError::NoTrustedProxies.into();
        assert!(err.to_string().contains("trusted proxy"));
    }
}
