//! Relaygazer binary entry point

use relaygazer::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging
/// 3. Initialize AppState
/// 4. Build Axum router
/// 5. Start background tasks (actor cache pruning)
/// 6. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging; RUST_LOG wins over the configured level
    let default_filter = format!("relaygazer={},tower_http=debug", config.logging.level);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting Relaygazer...");
    tracing::info!(
        domain = %config.server.domain,
        protocol = %config.server.protocol,
        "Configuration loaded"
    );

    relaygazer::metrics::init_metrics();

    // 3. Initialize application state
    let state = AppState::new(config.clone())?;

    // 4. Build Axum router
    let app = relaygazer::build_router(state.clone());

    // 5. Start background tasks
    if state.inbox.resolver().is_enabled() {
        spawn_cache_prune_task(state.clone());
    }

    // 6. Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Public URL: {}", config.server.base_url());

    axum::serve(listener, app).await?;

    Ok(())
}

/// Spawn background task evicting expired actor cache entries
fn spawn_cache_prune_task(state: AppState) {
    tokio::spawn(async move {
        let interval_secs = state.config.federation.key_cache_ttl_seconds.max(1);
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

        // Consume the immediate first tick
        interval.tick().await;

        loop {
            interval.tick().await;

            let resolver = state.inbox.resolver();
            resolver.prune_expired().await;
            let stats = resolver.stats().await;
            tracing::debug!(
                entries = stats.total_entries,
                valid = stats.valid_entries,
                "Actor cache pruned"
            );
        }
    });

    tracing::info!("Actor cache prune task spawned");
}
