//! Deelbreaker Backend Service
//!
//! Main entry point for the Deelbreaker deals backend.
//! This service provides:
//! - REST API for deals and group-buy joins
//! - WebSocket server for live price and participation updates

use deelbreaker_backend::auth::AuthConfig;
use deelbreaker_backend::database::{create_pool, run_migrations, Database};
use deelbreaker_backend::notifications::{NoopNotifier, NotificationSink};
use deelbreaker_backend::repositories::PgDealStore;
use deelbreaker_backend::websocket::WebSocketServer;
use deelbreaker_backend::{api, AppConfig, AppError, AppResult, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "deelbreaker_backend={},sqlx=warn,tower_http=info",
                    config.log_level
                )
                .into()
            }),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║         Deelbreaker Backend Service Starting              ║");
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!("HTTP port: {}", config.http_port);
    info!(
        "Group buy: {} off at threshold, {} join retries",
        config.group_buy.break_discount, config.group_buy.join_max_retries
    );

    // =========================================================================
    // DATABASE SETUP
    // =========================================================================
    info!("Connecting to database...");

    let pool = create_pool(&config.database).await.map_err(|e| {
        error!("Failed to create database pool: {}", e);
        AppError::Database(e)
    })?;
    info!("Database connection pool created (max {} connections)", config.database.max_connections);

    info!("Running database migrations...");
    run_migrations(&pool, None).await.map_err(|e| {
        error!("Database migration failed: {}", e);
        AppError::Database(e)
    })?;
    info!("Database migrations completed successfully");

    // =========================================================================
    // SERVICES
    // =========================================================================
    let ws_server = config.ws_port.map(|_| WebSocketServer::new());
    let notifier: Arc<dyn NotificationSink> = match &ws_server {
        Some(server) => Arc::new(server.clone()),
        None => Arc::new(NoopNotifier),
    };

    let state = AppState::new(
        Arc::new(PgDealStore::new(pool.clone())),
        &config.group_buy,
        AuthConfig::new(config.jwt_secret.clone()),
        notifier,
    )?
    .with_database(Database::new(pool));
    info!("✓ Application state initialized");

    // =========================================================================
    // START SERVERS
    // =========================================================================
    let ws_handle = match (ws_server, config.ws_port) {
        (Some(server), Some(port)) => {
            let ws_addr = SocketAddr::from(([0, 0, 0, 0], port));
            let listener = TcpListener::bind(ws_addr).await.map_err(|e| {
                AppError::Message(format!("Failed to bind WebSocket server: {}", e))
            })?;

            info!("✓ WebSocket server started on {}", ws_addr);
            Some(tokio::spawn(async move {
                if let Err(e) = server.run(listener).await {
                    error!("WebSocket server error: {}", e);
                }
            }))
        }
        _ => {
            warn!("WS_PORT not configured - live notifications disabled");
            None
        }
    };

    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(http_addr)
        .await
        .map_err(|e| AppError::Message(format!("Failed to bind HTTP server: {}", e)))?;
    let app = api::router(state);

    let http_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    });
    info!("✓ HTTP server started on {}", http_addr);

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║         Deelbreaker Backend Service Ready!                ║");
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Press Ctrl+C to shutdown gracefully");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = http_handle => {
            error!("HTTP server exited unexpectedly");
        }
        _ = async {
            if let Some(handle) = ws_handle {
                handle.await.ok();
            } else {
                futures::future::pending::<()>().await;
            }
        } => {
            error!("WebSocket server exited unexpectedly");
        }
    }

    info!("Deelbreaker backend service shutdown complete");
    Ok(())
}
