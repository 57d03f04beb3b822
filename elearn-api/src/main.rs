//! # Elearn API Server
//!
//! Serves the e-learning JSON API and receives FedaPay payment webhooks and
//! callbacks.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/elearn cargo run -p elearn-api
//! ```

use anyhow::Context;
use elearn_api::app::{build_router, AppState};
use elearn_api::config::Config;
use elearn_shared::db::migrations::run_migrations;
use elearn_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "elearn_api=debug,elearn_shared=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Elearn API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("Invalid configuration")?;
    tracing::info!(
        gateway_environment = %config.payments.environment,
        callback_url = %config.payments.callback_url(),
        "Configuration loaded"
    );

    let db_config = DatabaseConfig::new(config.database.url.clone())
        .with_max_connections(config.database.max_connections);
    let pool = create_pool(db_config)
        .await
        .context("Failed to connect to the database")?;

    run_migrations(&pool).await.context("Failed to run migrations")?;

    let bind_address = config.bind_address();
    let state = AppState::new(pool.clone(), config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown signal received, closing database pool...");
    close_pool(pool).await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
