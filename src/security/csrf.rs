//! CSRF protection using the double-submit cookie pattern.
//!
//! Safe requests (GET, HEAD, OPTIONS) lazily issue one token per session and
//! mirror it into a script-readable cookie. State-changing requests must echo
//! that token back in a header or a body field; it is compared against the
//! session copy in constant time.
//!
//! Routes marked exempt in the startup route table skip the check entirely.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderName, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::config::{CsrfConfig, RoutePolicy};
use crate::http::cookie::{SameSite, SetCookie};
use crate::http::session::Session;
use crate::observability::metrics;
use crate::security::error::{CsrfFailure, SecurityError};
use crate::security::path_within;

/// Session key holding the token.
pub const CSRF_SESSION_KEY: &str = "csrf_token";

/// Random bytes per token (256 bits).
const TOKEN_BYTES: usize = 32;

/// Compare two byte strings without leaking where they first differ.
///
/// Inputs of different lengths return false immediately; the length of a
/// token is not secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).into()
}

/// Read-only methods that never require a token.
pub fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// An opaque anti-forgery token.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    /// Generate a fresh 256-bit token, hex encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CsrfToken(..)")
    }
}

/// Startup-time table mapping path prefixes to a [`RoutePolicy`].
///
/// The longest matching prefix wins; unmatched paths are enforced. A prefix
/// matches whole path segments only (`/api/auth/login` does not cover
/// `/api/auth/loginx`).
#[derive(Debug, Clone, Default)]
pub struct RoutePolicyTable {
    rules: Vec<(String, RoutePolicy)>,
}

impl RoutePolicyTable {
    pub fn new(rules: impl IntoIterator<Item = (String, RoutePolicy)>) -> Self {
        let mut rules: Vec<_> = rules
            .into_iter()
            .map(|(prefix, policy)| (prefix.trim_end_matches('/').to_string(), policy))
            .collect();
        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { rules }
    }

    pub fn resolve(&self, path: &str) -> RoutePolicy {
        self.rules
            .iter()
            .find(|(prefix, _)| path_within(path, prefix))
            .map(|(_, policy)| *policy)
            .unwrap_or(RoutePolicy::Enforced)
    }
}

/// Outcome of a passing CSRF check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrfDecision {
    Allow,
    /// Allowed, and a new token was stored in the session. It must be
    /// mirrored into the response cookie.
    Issued(CsrfToken),
}

/// Issues and validates CSRF tokens.
#[derive(Debug, Clone)]
pub struct CsrfGuard {
    routes: RoutePolicyTable,
    header_names: Vec<HeaderName>,
    body_field: String,
    cookie_name: String,
    cookie_max_age: Duration,
    secure_cookie: bool,
}

impl CsrfGuard {
    pub fn from_config(config: &CsrfConfig, production: bool) -> Self {
        let header_names = config
            .header_names
            .iter()
            .filter_map(|name| match HeaderName::from_bytes(name.as_bytes()) {
                Ok(name) => Some(name),
                Err(_) => {
                    tracing::warn!(header = %name, "Ignoring invalid CSRF header name");
                    None
                }
            })
            .collect();

        Self {
            routes: RoutePolicyTable::new(
                config
                    .routes
                    .iter()
                    .map(|rule| (rule.path_prefix.clone(), rule.policy)),
            ),
            header_names,
            body_field: config.body_field.clone(),
            cookie_name: config.cookie_name.clone(),
            cookie_max_age: Duration::from_secs(config.cookie_max_age_secs),
            secure_cookie: production,
        }
    }

    pub fn route_policy(&self, path: &str) -> RoutePolicy {
        self.routes.resolve(path)
    }

    /// Whether the token for this request can only come from the body.
    pub fn needs_body(&self, method: &Method, path: &str, headers: &HeaderMap) -> bool {
        !is_safe(method)
            && self.route_policy(path) == RoutePolicy::Enforced
            && self.header_token(headers).is_none()
    }

    /// Validate a request against its session.
    ///
    /// `body` is consulted only when neither token header is present.
    pub fn check(
        &self,
        method: &Method,
        path: &str,
        session: &Session,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<CsrfDecision, CsrfFailure> {
        if self.route_policy(path) == RoutePolicy::Exempt {
            return Ok(CsrfDecision::Allow);
        }

        if is_safe(method) {
            return Ok(self.issue_if_absent(session));
        }

        let session_token = session
            .get(CSRF_SESSION_KEY)
            .ok_or(CsrfFailure::TokenRequired)?;

        let presented = match self.header_token(headers) {
            Some(token) => Some(token.to_string()),
            None => body.and_then(|body| self.body_token(headers, body)),
        }
        .ok_or(CsrfFailure::TokenMissing)?;

        if constant_time_eq(session_token.as_bytes(), presented.as_bytes()) {
            Ok(CsrfDecision::Allow)
        } else {
            Err(CsrfFailure::TokenInvalid)
        }
    }

    /// Store a new token unless the session already holds one.
    pub fn issue_if_absent(&self, session: &Session) -> CsrfDecision {
        let mut issued = None;
        session.insert_if_absent(CSRF_SESSION_KEY, || {
            let token = CsrfToken::generate();
            let value = token.as_str().to_string();
            issued = Some(token);
            value
        });

        match issued {
            Some(token) => {
                tracing::debug!(session_id = %session.id(), "CSRF token issued");
                metrics::record_csrf_token_issued();
                CsrfDecision::Issued(token)
            }
            None => CsrfDecision::Allow,
        }
    }

    /// The script-readable cookie mirroring `token`.
    pub fn cookie<'a>(&'a self, token: &'a CsrfToken) -> SetCookie<'a> {
        SetCookie {
            name: &self.cookie_name,
            value: token.as_str(),
            max_age: Some(self.cookie_max_age),
            http_only: false,
            secure: self.secure_cookie,
            same_site: SameSite::Lax,
        }
    }

    fn header_token<'h>(&self, headers: &'h HeaderMap) -> Option<&'h str> {
        self.header_names.iter().find_map(|name| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
        })
    }

    /// Read the token field from a JSON object or an urlencoded form.
    fn body_token(&self, headers: &HeaderMap, body: &[u8]) -> Option<String> {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        let token = if content_type.starts_with("application/x-www-form-urlencoded") {
            url::form_urlencoded::parse(body)
                .find(|(key, _)| key == self.body_field.as_str())
                .map(|(_, value)| value.into_owned())
        } else {
            serde_json::from_slice::<serde_json::Value>(body)
                .ok()
                .and_then(|value| {
                    value
                        .get(&self.body_field)
                        .and_then(|field| field.as_str())
                        .map(str::to_string)
                })
        };

        token.filter(|token| !token.is_empty())
    }
}

/// State for the CSRF middleware.
#[derive(Clone)]
pub struct CsrfState {
    pub guard: Arc<CsrfGuard>,
    pub max_body_size: usize,
}

/// Middleware enforcing CSRF validation on state-changing requests.
///
/// Must run inside the session middleware.
pub async fn csrf_middleware(
    State(state): State<CsrfState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(session) = request.extensions().get::<Session>().cloned() else {
        tracing::error!("CSRF check reached without a session, rejecting");
        return SecurityError::Csrf(CsrfFailure::TokenRequired).into_response();
    };

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let (request, body): (Request<Body>, Option<Bytes>) =
        if state.guard.needs_body(&method, &path, request.headers()) {
            let (parts, body) = request.into_parts();
            match axum::body::to_bytes(body, state.max_body_size).await {
                Ok(bytes) => (Request::from_parts(parts, Body::from(bytes.clone())), Some(bytes)),
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "Failed to buffer body for CSRF check");
                    return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
                }
            }
        } else {
            (request, None)
        };

    match state
        .guard
        .check(&method, &path, &session, request.headers(), body.as_deref())
    {
        Ok(CsrfDecision::Allow) => next.run(request).await,
        Ok(CsrfDecision::Issued(token)) => {
            let mut response = next.run(request).await;
            state.guard.cookie(&token).append_to(response.headers_mut());
            response
        }
        Err(failure) => {
            tracing::warn!(
                method = %method,
                path = %path,
                reason = failure.reason(),
                "CSRF validation failed"
            );
            metrics::record_csrf_failure(failure.reason());
            SecurityError::Csrf(failure).into_response()
        }
    }
}
