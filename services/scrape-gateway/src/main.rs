//! Scrape Gateway
//!
//! Single-binary service fronting the credential pools for third-party
//! scraping providers:
//! 1. Loads the durable credential store
//! 2. Serves the operator admin API (credential CRUD, probes, reactivation)
//! 3. Runs the background reactivation sweeper
//! 4. Exposes /health and /metrics

mod admin;
mod config;
mod metrics;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;
use scrape_credentials::CredentialStore;
use scrape_pool::Pool;

use crate::admin::AdminState;
use crate::config::Config;

/// Shared application state for the health and metrics handlers.
#[derive(Clone)]
struct AppState {
    pool: Arc<Pool>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the axum router: health and metrics plus the admin surface.
///
/// A concurrency limit layer caps simultaneous requests at `max_connections`.
fn build_router(state: AppState, admin_state: AdminState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(admin::build_admin_router(admin_state))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting scrape-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        credentials_path = %config.store.credentials_path.display(),
        providers = config.providers.len(),
        max_attempts = config.pool.max_attempts,
        "configuration loaded"
    );

    let store = CredentialStore::load(config.store.credentials_path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to load credential store from {}",
                config.store.credentials_path.display()
            )
        })?;
    let store = Arc::new(store);
    info!(credentials = store.len().await, "credential store loaded");

    let pool = Arc::new(Pool::new(
        store.clone(),
        config.call_timeout(),
        config.pool.max_attempts,
    ));

    // Background reactivation sweeper; aborted implicitly at process exit
    let sweeper = scrape_pool::spawn_sweeper_task(
        store.clone(),
        config.sweep_interval(),
        config.cooldown(),
    );
    info!(
        interval_secs = config.sweeper.interval_secs,
        cooldown_days = config.sweeper.cooldown_days,
        "reactivation sweeper running"
    );

    let operator_token = config
        .admin
        .token
        .take()
        .context("operator token missing after config validation")?;

    let admin_state = AdminState::new(
        pool.clone(),
        config.providers.clone(),
        reqwest::Client::new(),
        operator_token,
        config.cooldown(),
    );

    let app_state = AppState {
        pool,
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let app = build_router(app_state, admin_state, config.server.max_connections);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;

    info!(addr = %config.server.listen_addr, "accepting requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: pool summary per provider plus uptime.
/// Returns 200 while at least one provider has a selectable key, 503 once
/// none do (or no credentials are configured at all).
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = state.pool.health().await;
    if let Some(map) = body.as_object_mut() {
        map.insert(
            "uptime_seconds".to_string(),
            serde_json::json!(state.started_at.elapsed().as_secs()),
        );
    }

    let status_code = if body["status"] == "unhealthy" {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    } else {
        axum::http::StatusCode::OK
    };

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint — returns metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
