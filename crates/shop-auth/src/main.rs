//! 인증 서비스 실행 파일.

use anyhow::Context;
use secrecy::ExposeSecret;
use shop_auth::{
    metrics::setup_metrics_recorder, routes::create_app, AppState, AuthConfig, AuthService,
    PgCredentialStore,
};
use shop_core::logging::{init_logging, LogConfig};
use shop_core::TokenCodec;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    init_logging(LogConfig::from_env("shop-auth"))
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    // 비밀 키가 없으면 여기서 종료합니다.
    let config = match AuthConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    info!(
        listen_addr = %config.listen_addr,
        access_ttl_minutes = config.lifetimes.access.num_minutes(),
        refresh_ttl_days = config.lifetimes.refresh.num_days(),
        "Starting auth service..."
    );

    let metrics_handle = setup_metrics_recorder().context("failed to install metrics recorder")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .connect(config.database_url.expose_secret())
        .await
        .context("failed to connect to database")?;
    info!("Connected to database");

    let store = PgCredentialStore::new(pool);
    store.migrate().await.context("database migration failed")?;

    let codec = TokenCodec::new(&config.access_secret, &config.refresh_secret, config.lifetimes);
    let service = AuthService::new(Arc::new(store), codec, config.storage_timeout);
    let state = Arc::new(AppState::new(service).with_cookie_path(config.cookie_path.clone()));

    let app = create_app(state, Some(metrics_handle), config.request_timeout);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Auth service listening");

    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown_token.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_token.cancelled_owned())
        .await?;

    info!("Server stopped gracefully");
    Ok(())
}

/// Ctrl+C 또는 SIGTERM을 기다린 뒤 종료 토큰을 취소합니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    shutdown_token.cancel();
}
