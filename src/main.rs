use clap::Parser;
use drone_keyvault_secrets::{config::Config, error::AppError, server::run_server};
use tracing::info;

#[derive(Parser)]
#[command(name = "drone-keyvault-secrets")]
#[command(about = "Drone secrets plugin backed by Azure Key Vault")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file; when omitted, configuration comes from the
    /// environment alone
    #[arg(short, long)]
    config: Option<String>,
    /// Host to bind to (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
    /// Port to bind to (overrides config)
    #[arg(long, env = "SERVER_PORT")]
    port: Option<u16>,
    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    // Load configuration before initializing tracing so DRONE_DEBUG can
    // raise the log level.
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };

    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.debug {
        config.server.debug = true;
    }

    let default_level = if config.server.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                format!("drone_keyvault_secrets={default_level}")
                    .parse()
                    .map_err(|e| {
                        AppError::Server(drone_keyvault_secrets::error::ServerError::StartupError(
                            format!("invalid log directive: {}", e),
                        ))
                    })?,
            ),
        )
        .init();

    match &cli.config {
        Some(path) => info!("Configuration loaded from {}", path),
        None => info!("Configuration loaded from the environment"),
    }

    config.validate()?;

    info!("Starting Drone Key Vault secrets plugin");
    run_server(config).await
}
