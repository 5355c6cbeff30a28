use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod auth;
pub mod config;
pub mod context;
pub mod delivery;
pub mod error;
pub mod expiry;
pub mod heartbeat;
pub mod message;
pub mod presence;
pub mod queue;
pub mod routes;
pub mod storage;

use auth::InMemorySessions;
use config::Config;
use context::AppContext;
use storage::InMemoryMessageStore;

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let bind_address = format!("{}:{}", config.host, config.port);

    // Single-node wiring: in-memory store and session backend. A deployment
    // with durable collaborators swaps these Arcs.
    let store = Arc::new(InMemoryMessageStore::new());
    let sessions = Arc::new(InMemorySessions::new());

    let ctx = Arc::new(AppContext::new(config, store, sessions));

    // Rebuild expiration timers from persisted due-times
    let recovered = ctx.expirations.recover().await?;
    tracing::info!(recovered = recovered, "Expiration recovery complete");

    let router = routes::create_router(Arc::clone(&ctx));
    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!("Courier listening on http://{}", bind_address);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            tracing::info!("Shutdown signal received. Shutting down...");
        })
        .await?;

    ctx.shutdown().await;
    Ok(())
}
