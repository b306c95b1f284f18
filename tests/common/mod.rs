//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, Response},
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;

use marketplace_guard::config::GuardConfig;
use marketplace_guard::security::identity::{CallerIdentity, IdentityResolver, Role};
use marketplace_guard::GuardServer;

/// Header the test resolver reads the caller role from.
pub const TEST_ROLE_HEADER: &str = "x-test-role";

/// Identifies callers from a plain header, standing in for the account service.
pub struct HeaderRoleResolver;

impl IdentityResolver for HeaderRoleResolver {
    fn resolve(&self, headers: &HeaderMap) -> Option<CallerIdentity> {
        let role = match headers.get(TEST_ROLE_HEADER)?.to_str().ok()? {
            "customer" => Role::Customer,
            "provider" => Role::Provider,
            "admin" => Role::Admin,
            _ => return None,
        };
        Some(CallerIdentity {
            user_id: "user-1".to_string(),
            role,
        })
    }
}

/// Build a guard server with extra routes and the header-based resolver.
pub fn server(config: GuardConfig, routes: Router) -> GuardServer {
    GuardServer::new(config)
        .with_routes(routes)
        .with_identity_resolver(Arc::new(HeaderRoleResolver))
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// The `name=value` pair of a `Set-Cookie` header named `name`.
pub fn set_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{}=", name)))
        .map(str::to_string)
}

/// The value part of a `Set-Cookie` header named `name`.
pub fn cookie_pair(response: &Response<Body>, name: &str) -> Option<String> {
    set_cookie(response, name).and_then(|cookie| cookie.split(';').next().map(str::to_string))
}
