// Main entry point for the sync API server

use std::sync::Arc;

use anyhow::{Context, Result};
use aniquest_engine::Stores;
use aniquest_server::{kernel::ServerDeps, server::build_app, Config};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,aniquest_server=debug,aniquest_engine=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting AniQuest sync API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Pick the storage backend
    let stores = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Database connected");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Migrations complete");

            Stores::postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores (state lost on restart)");
            Stores::in_memory()
        }
    };

    // Build dependencies and start the platform consumers
    let deps = Arc::new(ServerDeps::new(stores, &config));
    deps.sync.start();

    let app = build_app(deps.clone());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    // Let in-flight events reach a terminal status before exit
    tracing::info!("Shutting down, draining consumers...");
    deps.sync.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        // Without a signal handler the server cannot be asked to stop
        // gracefully, but it should keep serving rather than exit.
        tracing::error!(error = %err, "failed to install shutdown signal handler");
        std::future::pending::<()>().await;
    }
}
