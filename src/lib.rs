//! Channel purger: empties chat channels through a rate-limited REST API.
//!
//! The [`purge`] module holds the engine, [`discord`] the HTTP client it
//! drives, and [`routes`] the small HTTP surface that triggers runs.

use std::sync::Arc;

use axum::{Router, routing::get};
use tokio_util::sync::CancellationToken;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

pub mod config;
pub mod discord;
#[cfg(feature = "server")]
pub mod observability;
pub mod purge;
pub mod routes;

#[cfg(test)]
mod tests;

use discord::{DiscordMessageStore, TransportError};
use purge::{MessageStore, Purger};
use routes::ActivePurges;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::PurgerConfig>,
    pub purger: Arc<Purger>,
    /// Channels with a run in flight; a second request for one gets 409.
    pub active_purges: ActivePurges,
    /// Cancelled on shutdown; every in-flight run observes it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// State backed by the real API client described in `config.discord`.
    pub fn new(config: config::PurgerConfig) -> Result<Self, TransportError> {
        let store = DiscordMessageStore::from_config(&config.discord)?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    pub fn with_store(config: config::PurgerConfig, store: Arc<dyn MessageStore>) -> Self {
        let purger = Purger::new(store, config.purge.clone());
        Self {
            config: Arc::new(config),
            purger: Arc::new(purger),
            active_purges: ActivePurges::default(),
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn build_app(config: &config::PurgerConfig, state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(routes::health::liveness))
        .nest("/api", routes::get_api_routes())
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
