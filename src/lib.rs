//! Relaygazer - A minimal ActivityPub relay endpoint
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - POST /inbox                                              │
//! │  - Actor, WebFinger, NodeInfo                               │
//! │  - Health and metrics                                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Federation Layer                           │
//! │  - Signature envelope, digest, admission rules              │
//! │  - Remote actor resolution (optional TTL cache)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `federation`: Inbox pipeline and its collaborators
//! - `keys`: Service key loading
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod config;
pub mod error;
pub mod federation;
pub mod keys;
pub mod metrics;

use std::sync::Arc;

use rsa::RsaPrivateKey;

use federation::{
    ActorDocument, CachedActorResolver, HttpActorResolver, InboxSettings, ServiceInboxPipeline,
};

/// Application state shared across all handlers
///
/// Cloned per request; everything inside is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Inbox admission pipeline
    pub inbox: Arc<ServiceInboxPipeline>,

    /// The relay's own actor document
    pub actor: Arc<ActorDocument>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Load the service private key
    /// 2. Build the actor document
    /// 3. Build the actor resolver and inbox pipeline
    ///
    /// # Errors
    /// Returns error if the key cannot be loaded or the HTTP client cannot be built
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let private_key = keys::load_private_key(&config.actor.private_key_path)?;
        tracing::info!(
            path = %config.actor.private_key_path.display(),
            "Service key loaded"
        );
        Self::with_private_key(config, &private_key)
    }

    /// Initialize application state with an already loaded key
    pub fn with_private_key(
        config: config::AppConfig,
        private_key: &RsaPrivateKey,
    ) -> Result<Self, error::AppError> {
        let public_key_pem = keys::public_key_pem(private_key)?;
        let actor = ActorDocument::local(&config.server.base_url(), &config.actor, &public_key_pem);

        let federation = &config.federation;
        let http_resolver = HttpActorResolver::new(
            &federation.user_agent,
            federation.fetch_timeout(),
            federation.allow_private_hosts,
        )
        .map_err(|e| error::AppError::Internal(e.into()))?;
        let resolver = CachedActorResolver::new(http_resolver, federation.key_cache_ttl());
        if resolver.is_enabled() {
            tracing::info!(
                ttl_seconds = federation.key_cache_ttl_seconds,
                "Actor cache enabled"
            );
        }

        let inbox = ServiceInboxPipeline::new(
            resolver,
            InboxSettings {
                fetch_timeout: federation.fetch_timeout(),
                signature_max_skew: federation.signature_max_skew(),
            },
        );

        tracing::info!(actor = %actor.id, "Application state initialized");

        Ok(Self {
            config: Arc::new(config),
            inbox: Arc::new(inbox),
            actor: Arc::new(actor),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::inbox_router(state.config.federation.max_body_bytes))
        .merge(api::actor_router())
        .merge(api::wellknown_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
