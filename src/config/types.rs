use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub azure: AzureConfig,
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment
    /// variables on top of whatever the file provided.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        crate::config::ConfigLoader::from_file(path)
    }

    /// Build configuration from environment variables alone.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay the environment variables the original plugin consumed.
    /// Environment values win over file values.
    pub fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("DRONE_BIND") {
            self.server.set_bind(&bind);
        }
        if let Ok(debug) = std::env::var("DRONE_DEBUG") {
            self.server.debug = matches!(debug.as_str(), "1" | "true" | "TRUE" | "True");
        }
        if let Ok(secret) = std::env::var("DRONE_SECRET") {
            self.transport.secret = secret;
        }
        if let Ok(tenant) = std::env::var("AZURE_TENANT_ID") {
            self.azure.tenant_id = tenant;
        }
        if let Ok(client_id) = std::env::var("AZURE_CLIENT_ID") {
            self.azure.client_id = client_id;
        }
        if let Ok(client_secret) = std::env::var("AZURE_CLIENT_SECRET") {
            self.azure.client_secret = client_secret;
        }
        if let Ok(debug) = std::env::var("AZURE_DEBUG") {
            self.azure.debug = matches!(debug.as_str(), "1" | "true" | "TRUE" | "True");
        }
    }

    /// Validate that everything required to serve requests is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if self.transport.secret.is_empty() {
            return Err(ConfigError::MissingSharedSecret);
        }
        self.azure.validate()?;
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Apply a bind address of the form "host:port". The original plugin
    /// accepted ":3000", meaning all interfaces.
    pub fn set_bind(&mut self, bind: &str) {
        if let Some((host, port)) = bind.rsplit_once(':') {
            if let Ok(port) = port.parse::<u16>() {
                self.port = port;
                if !host.is_empty() {
                    self.host = host.to_string();
                }
            }
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() || self.port == 0 {
            return Err(ConfigError::InvalidBindAddress {
                address: self.bind_address(),
            });
        }
        Ok(())
    }
}

/// Shared-secret transport configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Shared secret Drone uses to sign inbound requests.
    #[serde(default)]
    pub secret: String,
}

/// Azure service-principal credentials for the Key Vault client
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AzureConfig {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Extra request/response logging for vault calls.
    #[serde(default)]
    pub debug: bool,
}

impl AzureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("tenant_id", &self.tenant_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ] {
            if value.is_empty() {
                return Err(ConfigError::MissingAzureCredential {
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}
