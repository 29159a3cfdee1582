use lumen_orchestrator::{agent::Orchestrator, api::start_server, config::Config};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load environment variables
    let config = Config::from_env()?;

    info!("Lumen Gateway - API Server");
    info!("Port: {}", config.port);
    info!(
        identity = %config.identity_url,
        directory = %config.directory_url,
        timeout_secs = config.source_timeout.as_secs(),
        "Data sources"
    );

    // Built once, shared by every request
    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);

    info!(synthesizer = orchestrator.synthesizer_name(), "Orchestrator initialized");

    start_server(orchestrator, config.port).await?;

    Ok(())
}
