use anyhow::Context;
use baokim_payment::api::{self, AppState};
use baokim_payment::config::Config;
use baokim_payment::payments::{BaoKimClient, SystemClock};
use baokim_payment::store::{MemoryProviderLog, MemoryStore, RecordingCompleter};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;

    tracing::info!("Starting BaoKim payment service");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!(
        "Gateway: {} ({} protocol, live payments {})",
        config.gateway.endpoint(),
        config.gateway.protocol.variant,
        config.gateway.live_payments
    );
    tracing::info!("Webhook URL: {}", config.webhook_url());

    let clock = Arc::new(SystemClock);
    let gateway = Arc::new(
        BaoKimClient::new(config.gateway.clone(), clock.clone())
            .context("Failed to create BaoKim client")?,
    );

    let store = Arc::new(MemoryStore::new());
    match &config.demo_profile {
        Some(profile) => store.insert_profile(profile.clone()).await,
        None => tracing::warn!("BAOKIM_API_KEY / BAOKIM_API_SECRET not set, no payment profile"),
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("HOST and PORT must form a valid socket address")?;

    let state = AppState::new(
        config,
        gateway,
        store,
        Arc::new(MemoryProviderLog::new()),
        Arc::new(RecordingCompleter::new()),
        clock,
    );
    let banks = state.banks.clone();
    let app = api::router(state);

    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    banks.invalidate().await;
    tracing::info!("Bank list cache cleared, shutting down");

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
