use anyhow::{Context, Result};
use nowplaying::api::{create_router, AppState};
use nowplaying::config::AppConfig;
use std::net::SocketAddr;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nowplaying=info".into()),
        )
        .init();

    info!("Now playing service starting...");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    info!(
        port = config.port,
        secure_cookies = config.secure_cookies,
        rate_limit = config.tunables.rate_limit.capacity,
        rate_window_secs = config.tunables.rate_limit.window_seconds,
        upstream_timeout_secs = config.tunables.upstream.timeout_seconds,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config).context("Failed to initialize application state")?;
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .context("Failed to bind HTTP port")?;
    info!(port = config.port, "HTTP API listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    info!("Now playing service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl_c signal");
        return;
    }
    info!("Shutdown signal received");
}
