use anyhow::Context;
use axum::{Json, Router, response::IntoResponse, routing::get};
use bankgate_server::client::{SandboxBankClient, SandboxConfig};
use bankgate_server::config::Config;
use bankgate_server::session::{Session, StateStore, spawn_state_writer};
use bankgate_server::{AppState, api_routes};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

async fn health() -> Json<HealthResponse> {
    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime,
    })
}

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Record server start time
    START_TIME.set(Instant::now()).ok();

    // Initialize Prometheus metrics recorder (must be done before any metrics are recorded)
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "bankgate=debug,bankgate_server=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        "Loaded configuration: host={}, port={}, state_file={:?}",
        config.host, config.port, config.state_file
    );
    anyhow::ensure!(
        !config.account.number.is_empty(),
        "ACCOUNT_NO must be set to the operated account number"
    );

    // The session must not serve requests without its persisted state
    let store = StateStore::new(&config.state_file);
    let state = store
        .load()
        .await
        .with_context(|| format!("cannot start without session state {:?}", store.path()))?;
    info!("Loaded session state from {:?}", store.path());

    let account = config.account.to_account();
    let sandbox = SandboxConfig {
        token_ttl: config.sandbox.token_ttl,
        opening_balance: config.sandbox.opening_balance,
    };
    warn!("Using the in-process sandbox banking backend");
    let client = SandboxBankClient::resume(account.clone(), &state, sandbox)
        .context("failed to resume banking session")?;

    let (state_tx, state_writer) = spawn_state_writer(store);
    let session = Arc::new(Session::new(
        Box::new(client),
        account,
        config.session.to_session_config(),
        state_tx,
    ));
    if let Some(limit) = config.session.call_gate_timeout {
        info!("Banking calls give up after waiting {:?}", limit);
    }

    let app_state = AppState::new(session);

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics/prometheus", get(prometheus_metrics))
        .merge(api_routes(config.upload.max_upload_size))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Bankgate server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and with it the session) is gone; let the writer drain
    if let Err(e) = state_writer.await {
        warn!("State writer ended abnormally: {}", e);
    }
    info!("Server shutdown complete");

    Ok(())
}
