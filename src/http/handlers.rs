//! Application handlers.
//!
//! The marketplace's real business routes live in other services; these are
//! the endpoints the guard itself serves.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;
use crate::http::session::Session;
use crate::security::csrf::{CsrfDecision, CSRF_SESSION_KEY};
use crate::security::password::PasswordReport;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

/// Return the session's CSRF token, issuing one if needed.
///
/// Clients that cannot read the cookie (e.g. native apps) use this to obtain
/// the value they must echo back.
pub async fn csrf_token(State(state): State<AppState>, Extension(session): Extension<Session>) -> Response {
    let issued = match state.csrf.issue_if_absent(&session) {
        CsrfDecision::Issued(token) => Some(token),
        CsrfDecision::Allow => None,
    };

    let Some(token) = session.get(CSRF_SESSION_KEY) else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let mut response = Json(CsrfTokenResponse { csrf_token: token }).into_response();
    if let Some(token) = issued {
        state.csrf.cookie(&token).append_to(response.headers_mut());
    }
    response
}

#[derive(Debug, Deserialize)]
pub struct PasswordCheckRequest {
    pub password: String,
}

/// Evaluate a candidate password for registration forms.
pub async fn check_password(Json(request): Json<PasswordCheckRequest>) -> Json<PasswordReport> {
    Json(PasswordReport::evaluate(&request.password))
}

/// Authentication is served by the account service, not the guard.
pub async fn auth_placeholder() -> impl IntoResponse {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(serde_json::json!({
            "error": "not_implemented",
            "message": "Authentication is handled by the account service",
        })),
    )
}
