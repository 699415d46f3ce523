use crate::config::Config;
use crate::error::AppError;
use crate::resolver::Resolver;
use crate::server::handlers::{find_secret, health_check};
use crate::server::middleware::logging_middleware;
use crate::store::auth::VaultAuthorizer;
use crate::store::azure::KeyVaultClient;
use crate::store::StoreClient;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub resolver: Resolver,
}

impl AppState {
    /// Create application state backed by the real Key Vault client. The
    /// authorization handle is acquired once here and shared read-only by
    /// every concurrent resolution.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let auth = Arc::new(VaultAuthorizer::new(config.azure.clone()));
        let store: Arc<dyn StoreClient> =
            Arc::new(KeyVaultClient::new(auth)?.with_debug(config.azure.debug));
        Ok(Self::with_store(config, store))
    }

    /// Create application state with a substitute store client.
    pub fn with_store(config: Config, store: Arc<dyn StoreClient>) -> Self {
        Self {
            config: Arc::new(config),
            resolver: Resolver::new(store),
        }
    }
}

/// Create the main application router
pub fn create_app(state: AppState) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(logging_middleware));

    Router::new()
        .route("/", post(find_secret))
        .route("/healthz", get(health_check))
        .layer(middleware_stack)
        .with_state(state)
}
