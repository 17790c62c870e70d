use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use quota_gate::{
    AppState, cache,
    config::Config,
    limiter::{RateLimiter, RedisStrategy},
    router::create_router,
};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Configuration; invalid values stop startup here
    let config = Config::from_env().context("failed to load configuration")?;

    // Shared counter store
    let conn = cache::connect(&config)
        .await
        .context("failed to connect to Redis")?;
    let storage = RedisStrategy::new(conn, config.store_timeout());
    let limiter = RateLimiter::new(Arc::new(storage));

    tracing::info!(
        rps = config.ip_limit.requests_per_second,
        block_secs = config.ip_limit.block_duration.as_secs(),
        "Address limit"
    );
    tracing::info!(
        rps = config.token_limit.requests_per_second,
        block_secs = config.token_limit.block_duration.as_secs(),
        "Token limit"
    );
    tracing::info!(policy = ?config.failure_policy, "Store failure policy");

    let addr = SocketAddr::new(config.server_host, config.server_port);

    // Routes and middleware
    let state = AppState::new(config, limiter);
    let router = create_router(state);

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    // Serve with peer addresses available to the middleware
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
