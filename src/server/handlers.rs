use crate::error::{AppError, ServerError};
use crate::resolver::SecretRequest;
use crate::server::app::AppState;
use crate::server::signature::verify_request;
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// The secret request Drone posts to a plugin.
#[derive(Debug, Deserialize)]
pub struct PluginSecretRequest {
    /// Requested secret name; empty means the store's single `value` entry.
    #[serde(default)]
    pub name: String,
    /// Store (vault) name.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub build: PluginBuild,
    #[serde(default)]
    pub repo: PluginRepo,
}

#[derive(Debug, Default, Deserialize)]
pub struct PluginBuild {
    #[serde(default)]
    pub event: String,
    /// Target branch of the build.
    #[serde(default)]
    pub target: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PluginRepo {
    #[serde(default)]
    pub slug: String,
}

/// The secret Drone expects back.
#[derive(Debug, Serialize)]
pub struct PluginSecretResponse {
    pub name: String,
    pub data: String,
    pub pull_request: bool,
    pub pull_request_push: bool,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "drone-keyvault-secrets",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Resolve one secret for an authenticated build.
///
/// The raw body is needed twice (digest check, JSON parse), so the
/// signature is verified here rather than in an extractor.
pub async fn find_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PluginSecretResponse>, AppError> {
    verify_request(&state.config.transport.secret, &headers, &body)?;

    let request: PluginSecretRequest = serde_json::from_slice(&body)
        .map_err(|e| ServerError::MalformedBody(e.to_string()))?;

    let store_name = request.path.clone();
    let repo_slug = request.repo.slug.clone();

    let resolution = state
        .resolver
        .resolve(&SecretRequest {
            store_name: request.path,
            secret_name: request.name,
            build_event: request.build.event,
            repo_slug: request.repo.slug,
            target_branch: request.build.target,
        })
        .await?;

    info!(
        "resolved secret {} from store {} for {}",
        resolution.name, store_name, repo_slug
    );

    Ok(Json(PluginSecretResponse {
        name: resolution.name,
        data: resolution.value,
        pull_request: resolution.pull_request,
        pull_request_push: resolution.pull_request_push,
    }))
}
