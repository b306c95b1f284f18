//! Security error taxonomy and its HTTP mapping.
//!
//! Every error here is terminal for the request that produced it. Rate-limit
//! rejections carry actionable detail; CSRF failures collapse into a single
//! terse response so the three internal reasons cannot be told apart from
//! outside.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Why a state-changing request failed CSRF validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CsrfFailure {
    /// The session has never been issued a token.
    #[error("CSRF token not found in session")]
    TokenRequired,

    /// The request presented no token in either header or the body.
    #[error("CSRF token not provided")]
    TokenMissing,

    /// The presented token does not match the session token.
    #[error("CSRF token mismatch")]
    TokenInvalid,
}

impl CsrfFailure {
    /// Stable label used in logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            CsrfFailure::TokenRequired => "token_required",
            CsrfFailure::TokenMissing => "token_missing",
            CsrfFailure::TokenInvalid => "token_invalid",
        }
    }
}

/// Errors raised by the request security pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    /// The client exhausted its request budget for the current window.
    #[error("Too many requests: limit of {limit} per window exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { limit: u32, retry_after_secs: u64 },

    /// CSRF validation failed.
    #[error("CSRF validation failed: {0}")]
    Csrf(#[from] CsrfFailure),
}

impl IntoResponse for SecurityError {
    fn into_response(self) -> Response {
        match self {
            SecurityError::RateLimitExceeded {
                limit,
                retry_after_secs,
            } => {
                let body = json!({
                    "error": "rate_limit_exceeded",
                    "message": format!(
                        "Too many requests. Limit is {} per window, try again in {} seconds",
                        limit, retry_after_secs
                    ),
                    "limit": limit,
                    "retryAfter": retry_after_secs,
                });

                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                let headers = response.headers_mut();
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
                response
            }
            // One body for all three reasons.
            SecurityError::Csrf(_) => {
                let body = json!({
                    "error": "csrf_validation_failed",
                    "message": "Invalid CSRF token",
                });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_response_headers() {
        let response = SecurityError::RateLimitExceeded {
            limit: 30,
            retry_after_secs: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
        assert_eq!(response.headers()["x-ratelimit-limit"], "30");
    }

    #[tokio::test]
    async fn test_rate_limit_message_does_not_assume_a_minute() {
        let response = SecurityError::RateLimitExceeded {
            limit: 30,
            retry_after_secs: 42,
        }
        .into_response();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body["message"],
            "Too many requests. Limit is 30 per window, try again in 42 seconds"
        );
    }

    #[test]
    fn test_csrf_reasons_share_one_response() {
        for failure in [
            CsrfFailure::TokenRequired,
            CsrfFailure::TokenMissing,
            CsrfFailure::TokenInvalid,
        ] {
            let response = SecurityError::from(failure).into_response();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_error_display() {
        let err = SecurityError::RateLimitExceeded {
            limit: 10,
            retry_after_secs: 5,
        };
        assert!(err.to_string().contains("retry after 5s"));

        let err = SecurityError::Csrf(CsrfFailure::TokenMissing);
        assert_eq!(err.to_string(), "CSRF validation failed: CSRF token not provided");
        assert_eq!(CsrfFailure::TokenInvalid.reason(), "token_invalid");
    }
}
