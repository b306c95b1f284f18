//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Construct the security components once from configuration
//! - Wire them into the middleware stack in a fixed order
//! - Serve plain TCP or TLS with graceful shutdown
//! - Run the rate limit and session sweepers and apply hot-reloaded tier limits

use axum::{
    body::Body,
    http::{header, HeaderValue, Request},
    middleware::from_fn_with_state,
    routing::{any, get, post},
    Router,
};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GuardConfig;
use crate::http::handlers;
use crate::http::session::{session_middleware, SessionState, SessionStore};
use crate::lifecycle::SweeperHandle;
use crate::security::auth_monitor::{auth_monitor_middleware, AuthAnomalyMonitor};
use crate::security::csrf::{csrf_middleware, CsrfGuard, CsrfState};
use crate::security::identity::{identity_middleware, AnonymousResolver, IdentityResolver};
use crate::security::rate_limit::{rate_limit_middleware, RateLimitState, RateLimiter, TierLimits};

/// How long in-flight TLS connections get to finish after shutdown.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state: the security components and the startup configuration.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GuardConfig>,
    pub rate_limiter: Arc<RateLimiter>,
    pub csrf: Arc<CsrfGuard>,
    pub auth_monitor: Arc<AuthAnomalyMonitor>,
    pub sessions: SessionStore,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            rate_limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            csrf: Arc::new(CsrfGuard::from_config(&config.csrf, config.security.production)),
            auth_monitor: Arc::new(AuthAnomalyMonitor::from_config(&config.auth_monitor)),
            sessions: SessionStore::with_idle_timeout(Duration::from_secs(config.session.idle_timeout_secs)),
            started_at: Instant::now(),
            config: Arc::new(config),
        }
    }

    /// Apply the hot-reloadable part of a new configuration.
    pub fn apply_reload(&self, config: &GuardConfig) {
        self.rate_limiter.update_limits(TierLimits::from(&config.rate_limit));
    }
}

/// The guard's HTTP server.
pub struct GuardServer {
    state: AppState,
    routes: Router,
    identity: Arc<dyn IdentityResolver>,
}

impl GuardServer {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            state: AppState::new(config),
            routes: Router::new(),
            identity: Arc::new(AnonymousResolver),
        }
    }

    /// Mount additional routes behind the security pipeline.
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    /// Use `resolver` to identify callers for tiered rate limiting.
    pub fn with_identity_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.identity = resolver;
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with the full middleware stack.
    ///
    /// Outermost first: request id, trace, timeout, body limit, session,
    /// identity, rate limit, CSRF, auth monitor.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        let state = &self.state;
        let config = &state.config;

        let mut app = Router::new()
            .route("/health", get(handlers::health))
            .route("/api/csrf-token", get(handlers::csrf_token))
            .route("/api/password/check", post(handlers::check_password))
            .route("/api/auth/{*path}", any(handlers::auth_placeholder))
            .with_state(state.clone())
            .merge(self.routes.clone());

        if config.auth_monitor.enabled {
            app = app.layer(from_fn_with_state(state.auth_monitor.clone(), auth_monitor_middleware));
        }

        if config.csrf.enabled {
            let csrf_state = CsrfState {
                guard: state.csrf.clone(),
                max_body_size: config.security.max_body_size,
            };
            app = app.layer(from_fn_with_state(csrf_state, csrf_middleware));
        }

        if config.rate_limit.enabled {
            let rate_limit_state = RateLimitState {
                limiter: state.rate_limiter.clone(),
                trust_forwarded_for: config.rate_limit.trust_forwarded_for,
            };
            app = app.layer(from_fn_with_state(rate_limit_state, rate_limit_middleware));
        }

        let session_state = SessionState {
            store: state.sessions.clone(),
            cookie_name: config.session.cookie_name.clone(),
            secure: config.security.production,
        };

        app.layer(from_fn_with_state(self.identity.clone(), identity_middleware))
            .layer(from_fn_with_state(session_state, session_middleware))
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(SetResponseHeaderLayer::overriding(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve plain HTTP until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GuardConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let tasks = self.spawn_background_tasks(config_updates, &shutdown);
        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();

        let mut stop = shutdown.resubscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await?;

        tasks.stop().await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS until the shutdown signal fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        config_updates: mpsc::UnboundedReceiver<GuardConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let tasks = self.spawn_background_tasks(config_updates, &shutdown);
        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();

        let handle = Handle::new();
        let drain = handle.clone();
        let mut stop = shutdown.resubscribe();
        tokio::spawn(async move {
            let _ = stop.recv().await;
            drain.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        axum_server::bind_rustls(addr, tls).handle(handle).serve(app).await?;

        tasks.stop().await;
        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    fn spawn_background_tasks(
        &self,
        mut config_updates: mpsc::UnboundedReceiver<GuardConfig>,
        shutdown: &broadcast::Receiver<()>,
    ) -> BackgroundTasks {
        let config = &self.state.config;

        let mut sweepers = vec![self.state.sessions.spawn_sweeper(
            Duration::from_secs(config.session.sweep_interval_secs),
            shutdown.resubscribe(),
        )];
        if config.rate_limit.enabled {
            sweepers.push(self.state.rate_limiter.spawn_sweeper(
                Duration::from_secs(config.rate_limit.sweep_interval_secs),
                shutdown.resubscribe(),
            ));
        }

        let state = self.state.clone();
        let mut stop = shutdown.resubscribe();
        let reloader = tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(new_config) => state.apply_reload(&new_config),
                        None => break,
                    },
                    _ = stop.recv() => break,
                }
            }
        });

        BackgroundTasks { sweepers, reloader }
    }
}

struct BackgroundTasks {
    sweepers: Vec<SweeperHandle>,
    reloader: JoinHandle<()>,
}

impl BackgroundTasks {
    async fn stop(self) {
        for sweeper in self.sweepers {
            sweeper.stop().await;
        }
        self.reloader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_updates_tiers_only() {
        let state = AppState::new(GuardConfig::default());

        let mut next = GuardConfig::default();
        next.rate_limit.authenticated_per_window = 50;
        next.rate_limit.window_secs = 1;
        state.apply_reload(&next);

        assert_eq!(state.rate_limiter.limits().authenticated, 50);
        assert_eq!(state.rate_limiter.window(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_background_tasks_include_session_sweeper() {
        let server = GuardServer::new(GuardConfig::default());
        let (_tx, updates) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let tasks = server.spawn_background_tasks(updates, &shutdown_rx);
        assert_eq!(tasks.sweepers.len(), 2);
        assert!(tasks.sweepers.iter().all(SweeperHandle::is_running));
        tasks.stop().await;
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (_tx, updates) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let server = tokio::spawn(GuardServer::new(GuardConfig::default()).run(listener, updates, shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), server).await.unwrap();
        assert!(result.unwrap().is_ok());
    }
}
