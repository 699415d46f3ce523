use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("server error: {0}")]
    Server(#[from] ServerError),

    #[error("signature verification failed: {0}")]
    Signature(#[from] crate::server::signature::SignatureError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the remote secret store client
#[derive(Debug, Error)]
pub enum StoreError {
    /// The vault cannot be reached or the name does not resolve to one.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("store did not respond within {deadline_ms}ms")]
    Timeout { deadline_ms: u64 },

    #[error("entry not found: {key}")]
    EntryNotFound { key: String },

    #[error("store authorization failed: {reason}")]
    Unauthorized { reason: String },
}

/// The dimension of an access-control check that rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Event,
    Repository,
    Branch,
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dimension::Event => write!(f, "event"),
            Dimension::Repository => write!(f, "repository"),
            Dimension::Branch => write!(f, "branch"),
        }
    }
}

/// Terminal outcomes of a single resolution
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Enumeration of the named store failed. Covers both "does not exist"
    /// and "unreachable"; the two are not distinguished to the caller.
    #[error("store not found: {source}")]
    StoreNotFound {
        #[source]
        source: StoreError,
    },

    #[error("store did not respond within the deadline")]
    Timeout,

    #[error("secret key not found")]
    SecretKeyNotFound,

    #[error("access denied: {dimension} does not match")]
    AccessDenied { dimension: Dimension },
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid toml in {path}: {source}")]
    TomlParseError {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing shared secret (set [transport].secret or DRONE_SECRET)")]
    MissingSharedSecret,

    #[error("missing azure credential: {field}")]
    MissingAzureCredential { field: String },

    #[error("invalid bind address: {address}")]
    InvalidBindAddress { address: String },
}

/// Server-specific errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address {address}: {source}")]
    BindError {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server startup failed: {0}")]
    StartupError(String),

    #[error("malformed request body: {0}")]
    MalformedBody(String),
}

/// Convenience type for Results
pub type Result<T> = std::result::Result<T, AppError>;

// Axum error response implementation. Resolution failures map onto the
// statuses Drone expects: not-found style outcomes are 404, a filter
// rejection is 403, a store deadline is 504.
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::{http::StatusCode, Json};
        use serde_json::json;
        use tracing::warn;

        match &self {
            AppError::Resolve(ResolveError::AccessDenied { dimension }) => {
                warn!("access denied: {} does not match", dimension);
            }
            AppError::Signature(err) => {
                warn!("signature verification failed: {}", err);
            }
            _ => {}
        }

        let (status, error_message) = match &self {
            AppError::Resolve(ResolveError::StoreNotFound { .. }) => {
                (StatusCode::NOT_FOUND, "store not found")
            }
            AppError::Resolve(ResolveError::SecretKeyNotFound) => {
                (StatusCode::NOT_FOUND, "secret key not found")
            }
            AppError::Resolve(ResolveError::AccessDenied { .. }) => {
                (StatusCode::FORBIDDEN, "access denied")
            }
            AppError::Resolve(ResolveError::Timeout)
            | AppError::Store(StoreError::Timeout { .. }) => {
                (StatusCode::GATEWAY_TIMEOUT, "store timeout")
            }
            AppError::Store(StoreError::EntryNotFound { .. }) => {
                (StatusCode::NOT_FOUND, "entry not found")
            }
            AppError::Store(_) => (StatusCode::BAD_GATEWAY, "store unavailable"),
            AppError::Signature(_) => (StatusCode::UNAUTHORIZED, "invalid signature"),
            AppError::Server(ServerError::MalformedBody(_)) => {
                (StatusCode::BAD_REQUEST, "malformed request")
            }
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration error"),
            AppError::Server(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server error"),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal server error"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string()
        }));

        (status, body).into_response()
    }
}
