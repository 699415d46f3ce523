//! Azure AD token acquisition for the Key Vault client.
//!
//! The authorization handle is created once at process start and shared
//! read-only across concurrent resolutions; only the cached token behind
//! the async mutex is ever replaced.

use crate::config::AzureConfig;
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

const TOKEN_ENDPOINT_TEMPLATE: &str =
    "https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token";
const VAULT_SCOPE: &str = "https://vault.azure.net/.default";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token endpoint rejected the request: {status} {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to request token: {0}")]
    Request(String),

    #[error("failed to parse token response: {0}")]
    Parse(String),
}

enum Strategy {
    /// OAuth2 client-credentials flow against Azure AD.
    ClientCredentials {
        config: AzureConfig,
        token_endpoint: String,
    },
    /// Fixed bearer token, used by tests and Key Vault emulators.
    StaticToken { bearer: String },
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Process-wide authorization handle for the Key Vault client.
pub struct VaultAuthorizer {
    strategy: Strategy,
    cache: Mutex<Option<CachedToken>>,
}

impl VaultAuthorizer {
    pub fn new(config: AzureConfig) -> Self {
        let token_endpoint = TOKEN_ENDPOINT_TEMPLATE.replace("{tenant}", &config.tenant_id);
        Self::with_token_endpoint(config, token_endpoint)
    }

    /// Client-credentials authorizer against a non-default token endpoint.
    pub fn with_token_endpoint(config: AzureConfig, token_endpoint: String) -> Self {
        info!(
            "azure credential: client credentials (tenant_id={})",
            config.tenant_id
        );
        Self {
            strategy: Strategy::ClientCredentials {
                config,
                token_endpoint,
            },
            cache: Mutex::new(None),
        }
    }

    /// Authorizer that always presents the given bearer token.
    pub fn static_token(bearer: impl Into<String>) -> Self {
        Self {
            strategy: Strategy::StaticToken {
                bearer: bearer.into(),
            },
            cache: Mutex::new(None),
        }
    }

    /// Return a bearer token, fetching a fresh one when the cached token
    /// is absent or about to expire.
    pub async fn bearer_token(&self, http: &reqwest::Client) -> Result<String, AuthError> {
        let (config, token_endpoint) = match &self.strategy {
            Strategy::StaticToken { bearer } => return Ok(bearer.clone()),
            Strategy::ClientCredentials {
                config,
                token_endpoint,
            } => (config, token_endpoint),
        };

        let mut guard = self.cache.lock().await;
        if let Some(cached) = guard.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }

        let fresh = request_access_token(http, token_endpoint, config).await?;
        debug!("acquired azure access token (valid {:?})", fresh.expires_in);

        let token = fresh.token.clone();
        *guard = Some(CachedToken {
            token: fresh.token,
            expires_at: Instant::now() + fresh.expires_in,
        });
        Ok(token)
    }
}

struct AccessToken {
    token: String,
    expires_in: Duration,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u32>,
}

async fn request_access_token(
    http: &reqwest::Client,
    token_endpoint: &str,
    config: &AzureConfig,
) -> Result<AccessToken, AuthError> {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("scope", VAULT_SCOPE),
        ("grant_type", "client_credentials"),
    ];

    let response = http
        .post(token_endpoint)
        .form(&params)
        .send()
        .await
        .map_err(|err| AuthError::Request(err.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Rejected { status, body });
    }

    let payload: TokenResponse = response
        .json()
        .await
        .map_err(|err| AuthError::Parse(err.to_string()))?;

    // Refresh a minute early so an expiring token is never presented.
    let expires_in = payload
        .expires_in
        .unwrap_or(3600)
        .saturating_sub(60)
        .max(60);

    Ok(AccessToken {
        token: payload.access_token,
        expires_in: Duration::from_secs(u64::from(expires_in)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> AzureConfig {
        AzureConfig {
            tenant_id: "tenant-1".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            debug: false,
        }
    }

    #[tokio::test]
    async fn test_static_token_never_calls_the_network() {
        let auth = VaultAuthorizer::static_token("emulator");
        let http = reqwest::Client::new();
        let token = auth.bearer_token(&http).await.unwrap();
        assert_eq!(token, "emulator");
    }

    #[tokio::test]
    async fn test_client_credentials_round_trip_and_cache() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-abc",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let auth = VaultAuthorizer::with_token_endpoint(
            test_config(),
            format!("{}/token", server.uri()),
        );
        let http = reqwest::Client::new();

        // Two calls, one network request: the second is served from cache.
        assert_eq!(auth.bearer_token(&http).await.unwrap(), "tok-abc");
        assert_eq!(auth.bearer_token(&http).await.unwrap(), "tok-abc");
    }

    #[tokio::test]
    async fn test_rejected_credentials_surface_status_and_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad client"))
            .mount(&server)
            .await;

        let auth = VaultAuthorizer::with_token_endpoint(
            test_config(),
            format!("{}/token", server.uri()),
        );
        let http = reqwest::Client::new();

        let err = auth.bearer_token(&http).await.unwrap_err();
        match err {
            AuthError::Rejected { status, body } => {
                assert_eq!(status.as_u16(), 401);
                assert!(body.contains("bad client"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn test_token_endpoint_template_substitution() {
        let url = TOKEN_ENDPOINT_TEMPLATE.replace("{tenant}", "tenant-1");
        assert_eq!(
            url,
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token"
        );
    }
}
