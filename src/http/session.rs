//! Per-connection sessions.
//!
//! A session is a mutable string key-value container identified by an opaque
//! `sid` cookie. Unknown, forged or expired session IDs are never adopted: the
//! client gets a fresh session instead.
//!
//! A fresh session is only stored, and its cookie only sent, once something
//! is written to it. Read-only traffic from cookieless clients allocates
//! nothing. Stored sessions expire after an idle timeout and are removed by
//! a periodic sweep.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::http::cookie::{cookie_value, SameSite, SetCookie};
use crate::lifecycle::sweeper::{spawn_sweeper, SweeperHandle};
use crate::observability::metrics;

/// Idle timeout used by [`SessionStore::new`].
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
struct SessionData {
    values: HashMap<String, String>,
    last_seen: Instant,
}

impl SessionData {
    fn new(now: Instant) -> Self {
        Self {
            values: HashMap::new(),
            last_seen: now,
        }
    }
}

/// In-memory session storage shared by all connections.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<DashMap<String, SessionData>>,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            idle_timeout,
        }
    }

    pub fn load_or_create(&self, id: Option<&str>) -> (Session, bool) {
        self.load_or_create_at(id, Instant::now())
    }

    /// Resume the live session named by `id`, or hand out a new one.
    ///
    /// The boolean is true for a new session. A new session is not stored
    /// until a value is written to it.
    pub fn load_or_create_at(&self, id: Option<&str>, now: Instant) -> (Session, bool) {
        if let Some(id) = id {
            if let Some(mut data) = self.inner.get_mut(id) {
                if !self.is_idle(&data, now) {
                    data.last_seen = now;
                    return (self.handle(id.to_string()), false);
                }
            }
            // Drop an expired session the sweeper has not reached yet.
            self.inner.remove_if(id, |_, data| self.is_idle(data, now));
        }

        (self.handle(Uuid::new_v4().simple().to_string()), true)
    }

    /// Whether a session with this ID is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }

    /// Remove a session and everything stored in it.
    pub fn destroy(&self, id: &str) -> bool {
        self.inner.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Instant::now())
    }

    /// Drop every session idle for at least the timeout. Returns how many
    /// were removed.
    pub fn sweep_idle_at(&self, now: Instant) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, data| !self.is_idle(data, now));
        before.saturating_sub(self.inner.len())
    }

    /// Start the periodic sweep of idle sessions.
    pub fn spawn_sweeper(&self, interval: Duration, shutdown: broadcast::Receiver<()>) -> SweeperHandle {
        let store = self.clone();
        spawn_sweeper("session", interval, shutdown, move || {
            let removed = store.sweep_idle();
            let remaining = store.len();
            metrics::record_sessions(remaining);
            tracing::debug!(removed, remaining, "Session sweep completed");
        })
    }

    fn is_idle(&self, data: &SessionData, now: Instant) -> bool {
        now.saturating_duration_since(data.last_seen) >= self.idle_timeout
    }

    fn handle(&self, id: String) -> Session {
        Session {
            id,
            store: self.clone(),
        }
    }
}

/// Handle to one session, attached to each request's extensions.
#[derive(Clone)]
pub struct Session {
    id: String,
    store: SessionStore,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the session has been written to and is held by the store.
    pub fn is_stored(&self) -> bool {
        self.store.contains(&self.id)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.store
            .inner
            .get(&self.id)
            .and_then(|data| data.values.get(key).cloned())
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        let now = Instant::now();
        let mut data = self
            .store
            .inner
            .entry(self.id.clone())
            .or_insert_with(|| SessionData::new(now));
        data.last_seen = now;
        data.values.insert(key.into(), value.into());
    }

    /// Store `make()` under `key` unless a value is already present.
    ///
    /// Returns the value only when it was newly stored. The check and the
    /// insert happen under one shard lock, so concurrent requests on the same
    /// session cannot both store a value.
    pub fn insert_if_absent(&self, key: &str, make: impl FnOnce() -> String) -> Option<String> {
        let now = Instant::now();
        let mut data = self
            .store
            .inner
            .entry(self.id.clone())
            .or_insert_with(|| SessionData::new(now));
        data.last_seen = now;
        if data.values.contains_key(key) {
            return None;
        }
        let value = make();
        data.values.insert(key.to_string(), value.clone());
        Some(value)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish_non_exhaustive()
    }
}

/// State for the session middleware.
#[derive(Clone)]
pub struct SessionState {
    pub store: SessionStore,
    pub cookie_name: String,
    pub secure: bool,
}

/// Attach a [`Session`] to every request. The `sid` cookie is issued only
/// for new sessions that were written to while handling the request.
pub async fn session_middleware(
    State(state): State<SessionState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let presented = cookie_value(request.headers(), &state.cookie_name);
    let (session, created) = state.store.load_or_create(presented.as_deref());

    request.extensions_mut().insert(session.clone());
    let mut response = next.run(request).await;

    if created && session.is_stored() {
        tracing::debug!(session_id = %session.id(), "Session created");
        SetCookie {
            name: &state.cookie_name,
            value: session.id(),
            max_age: None,
            http_only: true,
            secure: state.secure,
            same_site: SameSite::Lax,
        }
        .append_to(response.headers_mut());
    }

    response
}
