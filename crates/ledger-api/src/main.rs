use std::sync::Arc;

use ledger_api::config::AppConfig;
use ledger_api::routes::{app_router, AppState};
use ledger_api::store::EntityStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ledger_api=info".parse()?))
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting ledger-api with config: {:?}", config);

    let store = if config.is_in_memory() {
        tracing::warn!("Using an in-memory entity store; data is lost on shutdown");
        EntityStore::open_in_memory()?
    } else {
        EntityStore::open(&config.db_path)?
    };

    let bind_addr = config.bind_addr.clone();
    let router = app_router(AppState::new(config, store));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("ledger-api listening on {}", bind_addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {error}");
        return;
    }
    tracing::info!("Shutting down ledger-api");
}
