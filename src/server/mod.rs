pub mod app;
pub mod handlers;
pub mod middleware;
pub mod signature;

pub use app::{create_app, AppState};
pub use handlers::{find_secret, health_check};

use crate::config::Config;
use crate::error::AppError;
use std::net::SocketAddr;
use std::str::FromStr;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

/// Run the server with the given configuration
pub async fn run_server(config: Config) -> Result<(), AppError> {
    let app_state = AppState::new(config.clone())?;
    let app = create_app(app_state);

    let addr = SocketAddr::from_str(&config.server.bind_address()).map_err(|e| {
        AppError::Server(crate::error::ServerError::StartupError(format!(
            "invalid server address: {}",
            e
        )))
    })?;

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        AppError::Server(crate::error::ServerError::BindError {
            address: addr.to_string(),
            source: e,
        })
    })?;

    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            AppError::Server(crate::error::ServerError::StartupError(format!(
                "server error: {}",
                e
            )))
        })?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}
