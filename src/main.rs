//! Marketplace Guard server.
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!   Client request     │                 MARKETPLACE GUARD                │
//!   ───────────────────┼─▶ request id → trace → timeout → body limit      │
//!                      │        → session → identity                      │
//!                      │        → rate limit (POST/PUT/PATCH/DELETE)      │
//!                      │        → CSRF (state-changing methods)           │
//!                      │        → auth monitor (/api/auth/*)              │
//!                      │        → handler                                 │
//!                      │                                                  │
//!                      │  config watcher ──▶ tier limits (hot reload)     │
//!                      │  sweeper task   ──▶ expired rate-limit windows   │
//!                      │  admin API      ──▶ status / auth / rate limits  │
//!                      └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use marketplace_guard::admin::setup_admin_router;
use marketplace_guard::config::{load_config, watcher::ConfigWatcher, GuardConfig};
use marketplace_guard::http::tls::load_tls_config;
use marketplace_guard::lifecycle::{shutdown_signal, Shutdown};
use marketplace_guard::observability::{logging::init_logging, metrics::init_metrics};
use marketplace_guard::GuardServer;

#[derive(Parser)]
#[command(name = "marketplace-guard")]
#[command(about = "HTTP security layer for the service marketplace", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "marketplace-guard starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        rate_limit = config.rate_limit.enabled,
        csrf = config.csrf.enabled,
        auth_monitor = config.auth_monitor.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();

    // Keep the watcher alive for the lifetime of the server.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => start_watcher(path),
        None => (mpsc::unbounded_channel().1, None),
    };

    let server = GuardServer::new(config.clone());

    if config.admin.enabled {
        let admin_app = setup_admin_router(server.state().clone());
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %config.admin.bind_address, "Admin API listening");

        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            let result = axum::serve(admin_listener, admin_app)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, draining connections");
        trigger.trigger();
    });

    match &config.listener.tls {
        Some(tls) => {
            let tls_config = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
            let addr: SocketAddr = config.listener.bind_address.parse()?;
            server.run_tls(addr, tls_config, config_updates, shutdown.subscribe()).await?;
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            server.run(listener, config_updates, shutdown.subscribe()).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn start_watcher(path: &Path) -> (mpsc::UnboundedReceiver<GuardConfig>, Option<notify::RecommendedWatcher>) {
    let (watcher, updates) = ConfigWatcher::new(path);
    match watcher.run() {
        Ok(handle) => (updates, Some(handle)),
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload disabled");
            (updates, None)
        }
    }
}
