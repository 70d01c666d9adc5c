//! thumbnail-studio HTTP Server
//!
//! Axum server for checkout, Stripe webhooks, credits, prompt enhancement and
//! thumbnail generation.

mod auth;
mod config;
mod error;
mod handlers;
mod routes;
mod state;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    tracing::debug!(?config, "Configuration loaded");

    let state = AppState::from_config(&config)?;

    if state.enhancer.provider_healthy().await {
        tracing::info!(provider = state.enhancer.provider_name(), "Completion provider reachable");
    } else {
        tracing::warn!(
            provider = state.enhancer.provider_name(),
            "Completion provider not reachable - prompt enhancement will fail"
        );
    }

    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("thumbnail-studio server running on http://{}", config.bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                - Health check");
    tracing::info!("  POST /api/checkout          - Start subscription checkout");
    tracing::info!("  POST /api/webhooks/stripe   - Stripe webhook receiver");
    tracing::info!("  POST /api/enhance-prompt    - Rewrite a thumbnail prompt");
    tracing::info!("  GET  /api/credits           - Credit balance");
    tracing::info!("  POST /api/users/me          - Sync signed-in user");
    tracing::info!("  POST /api/generate          - Generate a thumbnail");
    tracing::info!("  GET  /api/thumbnails        - Generation history");
    tracing::info!("  GET  /api/subscription      - Subscription summary");
    if config.expose_diagnostics {
        tracing::info!("  GET  /api/test-token        - Diagnostic token check");
    }

    axum::serve(listener, app).await?;

    Ok(())
}
