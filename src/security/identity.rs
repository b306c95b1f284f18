//! Caller identity and client key resolution.
//!
//! Authentication itself lives in the account service. That service (or a
//! layer in front of it) implements [`IdentityResolver`]; the resolved
//! [`CallerIdentity`] is attached to the request before rate limiting so the
//! limiter can pick the caller's tier.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

/// Header carrying the proxy chain, client first.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Key used when no client address can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Marketplace account roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Provider,
    Admin,
}

/// Context attached to authenticated requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
    pub role: Role,
}

/// Privilege class used to pick a rate-limit ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerTier {
    Anonymous,
    Authenticated,
    Privileged,
}

impl CallerTier {
    /// Resolve the tier of an optional caller.
    pub fn resolve(identity: Option<&CallerIdentity>) -> Self {
        match identity {
            Some(CallerIdentity {
                role: Role::Admin, ..
            }) => CallerTier::Privileged,
            Some(_) => CallerTier::Authenticated,
            None => CallerTier::Anonymous,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallerTier::Anonymous => "anonymous",
            CallerTier::Authenticated => "authenticated",
            CallerTier::Privileged => "privileged",
        }
    }
}

/// Resolves the caller of a request from its headers.
pub trait IdentityResolver: Send + Sync + 'static {
    fn resolve(&self, headers: &HeaderMap) -> Option<CallerIdentity>;
}

/// Resolver used when no account service is wired in: everyone is anonymous.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousResolver;

impl IdentityResolver for AnonymousResolver {
    fn resolve(&self, _headers: &HeaderMap) -> Option<CallerIdentity> {
        None
    }
}

/// Derive the rate-limit key for a client.
///
/// Prefers the first address of the `X-Forwarded-For` chain (when trusted),
/// then the peer address, then [`UNKNOWN_CLIENT`].
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => UNKNOWN_CLIENT.to_string(),
    }
}

/// [`client_key`] for a request, reading the peer from `ConnectInfo` when the
/// server was started with connect info.
pub fn request_client_key<B>(request: &Request<B>, trust_forwarded_for: bool) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_key(request.headers(), peer, trust_forwarded_for)
}

/// Attach the resolved [`CallerIdentity`], if any, to the request.
pub async fn identity_middleware(
    State(resolver): State<Arc<dyn IdentityResolver>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(identity) = resolver.resolve(request.headers()) {
        tracing::trace!(user_id = %identity.user_id, role = ?identity.role, "Caller identified");
        request.extensions_mut().insert(identity);
    }
    next.run(request).await
}
