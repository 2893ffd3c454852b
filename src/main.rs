use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use casebook_api::config::config;
use casebook_api::database::{DatabaseManager, MemoryStore, PgStore, Store};
use casebook_api::services::SystemClock;
use casebook_api::{app, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("casebook_api=info,tower_http=info")),
        )
        .init();

    // Initialize configuration (this loads the config singleton)
    let config = config();
    tracing::info!("Starting Casebook API in {:?} mode", config.environment);

    let store = open_store().await?;
    tracing::info!(backend = store.backend(), "Store ready");

    let state = AppState::new(store, Arc::new(SystemClock));
    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Casebook API listening on http://{}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    DatabaseManager::close_all().await;
    Ok(())
}

/// Postgres when DATABASE_URL is set, otherwise the in-memory store if the
/// environment allows it
async fn open_store() -> Result<Arc<dyn Store>> {
    let settings = &config().database;

    if std::env::var("DATABASE_URL").is_err() {
        if settings.allow_memory_fallback {
            tracing::warn!("DATABASE_URL not set; serving from the in-memory store (data is not persisted)");
            return Ok(Arc::new(MemoryStore::new()));
        }
        anyhow::bail!("DATABASE_URL must be set in this environment");
    }

    let store = PgStore::connect().await.context("failed to connect to PostgreSQL")?;
    if settings.auto_migrate {
        let applied = DatabaseManager::migrate(store.pool())
            .await
            .context("failed to apply schema")?;
        tracing::info!(statements = applied, "Schema applied");
    }
    Ok(Arc::new(store))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
