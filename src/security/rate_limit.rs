//! Fixed-window rate limiting with caller tiers.
//!
//! Only mutating requests (POST, PUT, PATCH, DELETE) are counted. Each client
//! key owns one window: the first request opens it with a count of 1, later
//! requests increment the count and are rejected once it exceeds the tier
//! ceiling. A background sweeper drops entries whose window has elapsed so
//! abandoned keys do not accumulate.
//!
//! State is process-local. Several instances behind a load balancer each
//! enforce the limit on their own share of the traffic, so the aggregate
//! ceiling is under-enforced.

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::config::RateLimitConfig;
use crate::lifecycle::sweeper::{self, SweeperHandle};
use crate::observability::metrics;
use crate::security::error::SecurityError;
use crate::security::identity::{request_client_key, CallerIdentity, CallerTier};

/// Requests allowed per window for each caller tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierLimits {
    pub privileged: u32,
    pub authenticated: u32,
    pub anonymous: u32,
}

impl TierLimits {
    pub fn for_tier(&self, tier: CallerTier) -> u32 {
        match tier {
            CallerTier::Privileged => self.privileged,
            CallerTier::Authenticated => self.authenticated,
            CallerTier::Anonymous => self.anonymous,
        }
    }
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            privileged: 100,
            authenticated: 30,
            anonymous: 10,
        }
    }
}

impl From<&RateLimitConfig> for TierLimits {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            privileged: config.privileged_per_window,
            authenticated: config.authenticated_per_window,
            anonymous: config.anonymous_per_window,
        }
    }
}

/// Counter for one client key.
#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    window_reset_at: Instant,
}

impl RateLimitEntry {
    fn opening(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            window_reset_at: now + window,
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allow,
    Reject { retry_after_secs: u64, limit: u32 },
}

impl RateLimitDecision {
    pub fn into_result(self) -> Result<(), SecurityError> {
        match self {
            RateLimitDecision::Allow => Ok(()),
            RateLimitDecision::Reject {
                retry_after_secs,
                limit,
            } => Err(SecurityError::RateLimitExceeded {
                limit,
                retry_after_secs,
            }),
        }
    }
}

/// Whether a method creates, updates or deletes.
pub fn is_mutating(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

/// Per-client fixed-window counter table.
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    limits: ArcSwap<TierLimits>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limits: TierLimits, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            limits: ArcSwap::from_pointee(limits),
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(TierLimits::from(config), Duration::from_secs(config.window_secs))
    }

    /// Current tier ceilings.
    pub fn limits(&self) -> TierLimits {
        **self.limits.load()
    }

    /// Replace the tier ceilings. Live windows keep their counts.
    pub fn update_limits(&self, limits: TierLimits) {
        let previous = self.limits.swap(Arc::new(limits));
        if *previous != limits {
            tracing::info!(
                privileged = limits.privileged,
                authenticated = limits.authenticated,
                anonymous = limits.anonymous,
                "Rate limit tiers updated"
            );
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of client keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    pub fn check(&self, method: &Method, tier: CallerTier, client_key: &str) -> RateLimitDecision {
        self.check_at(method, tier, client_key, Instant::now())
    }

    /// Count a request arriving at `now`.
    ///
    /// The request that opens a window is never itself compared against the
    /// ceiling, so exactly `limit` requests pass per window and the
    /// `limit + 1`-th is the first rejection.
    pub fn check_at(
        &self,
        method: &Method,
        tier: CallerTier,
        client_key: &str,
        now: Instant,
    ) -> RateLimitDecision {
        if !is_mutating(method) {
            return RateLimitDecision::Allow;
        }

        let limit = self.limits.load().for_tier(tier);

        match self.entries.entry(client_key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(RateLimitEntry::opening(now, self.window));
                RateLimitDecision::Allow
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                if now >= entry.window_reset_at {
                    *entry = RateLimitEntry::opening(now, self.window);
                    return RateLimitDecision::Allow;
                }

                entry.count = entry.count.saturating_add(1);
                if entry.count > limit {
                    RateLimitDecision::Reject {
                        retry_after_secs: ceil_secs(entry.window_reset_at - now),
                        limit,
                    }
                } else {
                    RateLimitDecision::Allow
                }
            }
        }
    }

    /// Drop every entry whose window has elapsed. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.window_reset_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Start the periodic sweep of elapsed windows.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> SweeperHandle {
        let limiter = Arc::clone(self);
        sweeper::spawn_sweeper("rate_limit", interval, shutdown, move || {
            let removed = limiter.sweep_expired();
            let remaining = limiter.tracked_keys();
            metrics::record_rate_limit_entries(remaining);
            tracing::debug!(removed, remaining, "Rate limit sweep completed");
        })
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// State for the rate-limit middleware.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub trust_forwarded_for: bool,
}

/// Middleware gating mutating requests by caller tier.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !is_mutating(request.method()) {
        return next.run(request).await;
    }

    let tier = CallerTier::resolve(request.extensions().get::<CallerIdentity>());
    let key = request_client_key(&request, state.trust_forwarded_for);

    match state.limiter.check(request.method(), tier, &key).into_result() {
        Ok(()) => next.run(request).await,
        Err(err) => {
            tracing::warn!(client = %key, tier = tier.as_str(), error = %err, "Rate limit exceeded");
            metrics::record_rate_limited(tier.as_str());
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(TierLimits::default(), Duration::from_secs(60))
    }

    #[test]
    fn test_read_only_requests_are_never_counted() {
        let limiter = limiter();
        let now = Instant::now();
        for _ in 0..500 {
            assert_eq!(
                limiter.check_at(&Method::GET, CallerTier::Anonymous, "10.0.0.1", now),
                RateLimitDecision::Allow
            );
        }
        assert_eq!(limiter.check_at(&Method::HEAD, CallerTier::Anonymous, "10.0.0.1", now), RateLimitDecision::Allow);
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_exactly_limit_requests_pass_per_tier() {
        let limiter = limiter();
        let now = Instant::now();

        for (tier, limit) in [
            (CallerTier::Anonymous, 10),
            (CallerTier::Authenticated, 30),
            (CallerTier::Privileged, 100),
        ] {
            let key = tier.as_str();
            for i in 0..limit {
                assert_eq!(
                    limiter.check_at(&Method::POST, tier, key, now),
                    RateLimitDecision::Allow,
                    "request {} for {:?} should pass",
                    i + 1,
                    tier
                );
            }
            assert_eq!(
                limiter.check_at(&Method::POST, tier, key, now),
                RateLimitDecision::Reject {
                    retry_after_secs: 60,
                    limit
                }
            );
        }
    }

    #[test]
    fn test_retry_after_tracks_remaining_window() {
        let limiter = limiter();
        let start = Instant::now();
        for _ in 0..10 {
            limiter.check_at(&Method::DELETE, CallerTier::Anonymous, "k", start);
        }

        let later = start + Duration::from_millis(45_500);
        assert_eq!(
            limiter.check_at(&Method::DELETE, CallerTier::Anonymous, "k", later),
            RateLimitDecision::Reject {
                retry_after_secs: 15,
                limit: 10
            }
        );
    }

    #[test]
    fn test_authenticated_scenario_with_window_reset() {
        let limiter = limiter();
        let start = Instant::now();

        for _ in 0..30 {
            assert!(limiter
                .check_at(&Method::PUT, CallerTier::Authenticated, "198.51.100.1", start)
                .into_result()
                .is_ok());
        }

        let err = limiter
            .check_at(&Method::PUT, CallerTier::Authenticated, "198.51.100.1", start)
            .into_result()
            .unwrap_err();
        assert!(matches!(err, SecurityError::RateLimitExceeded { limit: 30, .. }));

        let after = start + Duration::from_secs(61);
        assert_eq!(
            limiter.check_at(&Method::PUT, CallerTier::Authenticated, "198.51.100.1", after),
            RateLimitDecision::Allow
        );

        // The window restarted at a count of 1: 29 more fit, then reject.
        for _ in 0..29 {
            assert_eq!(
                limiter.check_at(&Method::PUT, CallerTier::Authenticated, "198.51.100.1", after),
                RateLimitDecision::Allow
            );
        }
        assert!(matches!(
            limiter.check_at(&Method::PUT, CallerTier::Authenticated, "198.51.100.1", after),
            RateLimitDecision::Reject { .. }
        ));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter();
        let now = Instant::now();
        for _ in 0..11 {
            limiter.check_at(&Method::POST, CallerTier::Anonymous, "a", now);
        }
        assert!(matches!(
            limiter.check_at(&Method::POST, CallerTier::Anonymous, "a", now),
            RateLimitDecision::Reject { .. }
        ));
        assert_eq!(
            limiter.check_at(&Method::POST, CallerTier::Anonymous, "b", now),
            RateLimitDecision::Allow
        );
    }

    #[test]
    fn test_sweep_removes_only_elapsed_windows() {
        let limiter = limiter();
        let start = Instant::now();
        limiter.check_at(&Method::POST, CallerTier::Anonymous, "old", start);
        limiter.check_at(&Method::POST, CallerTier::Anonymous, "fresh", start + Duration::from_secs(50));

        let removed = limiter.sweep_expired_at(start + Duration::from_secs(70));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_update_limits_keeps_counts() {
        let limiter = limiter();
        let now = Instant::now();
        for _ in 0..5 {
            limiter.check_at(&Method::POST, CallerTier::Anonymous, "k", now);
        }

        limiter.update_limits(TierLimits {
            privileged: 100,
            authenticated: 30,
            anonymous: 5,
        });
        assert_eq!(limiter.limits().anonymous, 5);
        assert!(matches!(
            limiter.check_at(&Method::POST, CallerTier::Anonymous, "k", now),
            RateLimitDecision::Reject { limit: 5, .. }
        ));
    }

    #[tokio::test]
    async fn test_sweeper_runs_and_stops() {
        let limiter = Arc::new(RateLimiter::new(TierLimits::default(), Duration::from_millis(10)));
        limiter.check(&Method::POST, CallerTier::Anonymous, "k");
        assert_eq!(limiter.tracked_keys(), 1);

        let (tx, rx) = broadcast::channel(1);
        let handle = limiter.spawn_sweeper(Duration::from_millis(20), rx);
        assert!(handle.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(limiter.tracked_keys(), 0);

        handle.stop().await;
        drop(tx);
    }

    #[tokio::test]
    async fn test_sweeper_exits_on_shutdown() {
        let limiter = Arc::new(RateLimiter::new(TierLimits::default(), Duration::from_secs(60)));
        let (tx, rx) = broadcast::channel(1);
        let handle = limiter.spawn_sweeper(Duration::from_secs(300), rx);

        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_running());
    }
}
