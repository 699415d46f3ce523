//! Azure Key Vault implementation of the store client.
//!
//! Enumeration is list-then-fetch: the vault's secret listing only carries
//! identifiers and tags, so every entry's current value is resolved with an
//! individual fetch under the same call deadline. The filter-list entries
//! the resolver looks for live in the vault alongside ordinary secrets and
//! are discovered by this scan.

use crate::store::auth::{AuthError, VaultAuthorizer};
use crate::store::{Entry, StoreClient, StoreError, STORE_DEADLINE};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const SECRETS_API_VERSION: &str = "7.4";
const VAULT_URL_TEMPLATE: &str = "https://{store}.vault.azure.net";

/// Key Vault REST client. Cheap to clone; the authorization handle and the
/// connection pool are shared.
#[derive(Clone)]
pub struct KeyVaultClient {
    http: reqwest::Client,
    auth: Arc<VaultAuthorizer>,
    vault_url_template: String,
    deadline: Duration,
    debug: bool,
}

impl KeyVaultClient {
    pub fn new(auth: Arc<VaultAuthorizer>) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("drone-keyvault-secrets/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| StoreError::Unavailable {
                reason: format!("failed to create HTTP client: {err}"),
            })?;

        Ok(Self {
            http,
            auth,
            vault_url_template: VAULT_URL_TEMPLATE.to_string(),
            deadline: STORE_DEADLINE,
            debug: false,
        })
    }

    /// Point the client at a non-default vault endpoint (tests, emulators).
    pub fn with_vault_url_template(mut self, template: impl Into<String>) -> Self {
        self.vault_url_template = template.into();
        self
    }

    /// Override the fixed per-call deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Log every vault request and response status at info level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn vault_base_url(&self, store_name: &str) -> String {
        self.vault_url_template.replace("{store}", store_name)
    }

    async fn bearer(&self) -> Result<String, StoreError> {
        self.auth.bearer_token(&self.http).await.map_err(|err| match err {
            AuthError::Rejected { status, body } => StoreError::Unauthorized {
                reason: format!("{status} {body}"),
            },
            other => StoreError::Unavailable {
                reason: other.to_string(),
            },
        })
    }

    async fn get_json(&self, url: &str) -> Result<reqwest::Response, StoreError> {
        let token = self.bearer().await?;
        if self.debug {
            info!("vault request: GET {}", url);
        } else {
            debug!("vault request: GET {}", url);
        }

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    StoreError::Timeout {
                        deadline_ms: self.deadline.as_millis() as u64,
                    }
                } else {
                    StoreError::Unavailable {
                        reason: err.to_string(),
                    }
                }
            })?;

        if self.debug {
            info!("vault response: {} {}", response.status(), url);
        }
        Ok(response)
    }

    async fn list_inner(&self, store_name: &str) -> Result<Vec<Entry>, StoreError> {
        let base = self.vault_base_url(store_name);
        let mut url = format!("{base}/secrets?api-version={SECRETS_API_VERSION}");
        let mut entries = Vec::new();

        loop {
            let response = self.get_json(&url).await?;
            let status = response.status();

            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                let body = response.text().await.unwrap_or_default();
                return Err(StoreError::Unauthorized {
                    reason: format!("{status} {body}"),
                });
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(StoreError::Unavailable {
                    reason: format!("list secrets failed: {status} {body}"),
                });
            }

            let page: SecretListResponse = response.json().await.map_err(|err| {
                StoreError::Unavailable {
                    reason: format!("failed to decode secret listing: {err}"),
                }
            })?;

            for item in page.value.unwrap_or_default() {
                let Some(key) = extract_secret_name(&item.id) else {
                    continue;
                };
                // Always the latest version of each secret.
                let value = self.get_value(&base, key).await?;
                entries.push(Entry {
                    key: key.to_string(),
                    value,
                    store_name: store_name.to_string(),
                    tags: item.tags.unwrap_or_default(),
                });
            }

            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }

        debug!("listed {} entries from vault {}", entries.len(), store_name);
        Ok(entries)
    }

    async fn get_value(&self, base: &str, key: &str) -> Result<String, StoreError> {
        let url = format!("{base}/secrets/{key}?api-version={SECRETS_API_VERSION}");
        let response = self.get_json(&url).await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::EntryNotFound {
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable {
                reason: format!("get secret failed: {status} {body}"),
            });
        }

        let bundle: SecretBundle = response.json().await.map_err(|err| {
            StoreError::Unavailable {
                reason: format!("failed to decode secret bundle: {err}"),
            }
        })?;
        Ok(bundle.value)
    }

    async fn fetch_inner(&self, store_name: &str, key: &str) -> Result<Entry, StoreError> {
        let base = self.vault_base_url(store_name);
        let value = self.get_value(&base, key).await?;
        Ok(Entry {
            key: key.to_string(),
            value,
            store_name: store_name.to_string(),
            tags: HashMap::new(),
        })
    }

    fn timeout_error(&self) -> StoreError {
        StoreError::Timeout {
            deadline_ms: self.deadline.as_millis() as u64,
        }
    }
}

#[async_trait]
impl StoreClient for KeyVaultClient {
    async fn list_entries(&self, store_name: &str) -> Result<Vec<Entry>, StoreError> {
        tokio::time::timeout(self.deadline, self.list_inner(store_name))
            .await
            .map_err(|_| self.timeout_error())?
    }

    async fn fetch_entry(&self, store_name: &str, key: &str) -> Result<Entry, StoreError> {
        tokio::time::timeout(self.deadline, self.fetch_inner(store_name, key))
            .await
            .map_err(|_| self.timeout_error())?
    }
}

/// The vault identifies secrets by URL; the entry key is the last segment.
fn extract_secret_name(id: &str) -> Option<&str> {
    id.rsplit('/').next().filter(|name| !name.is_empty())
}

#[derive(Deserialize)]
struct SecretListResponse {
    #[serde(default)]
    value: Option<Vec<SecretListItem>>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct SecretListItem {
    id: String,
    #[serde(default)]
    tags: Option<HashMap<String, Option<String>>>,
}

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
}
