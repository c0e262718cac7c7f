//! Runs the supervisor with its HTTP control API until interrupted.
//!
//! Run with: `cargo run --example control_api -- supervisor.json`
//! Then try:
//!   curl http://127.0.0.1:8085/status
//!   curl -X POST http://127.0.0.1:8085/servers/<id>/start

use mcp_supervisor::api::ApiServer;
use mcp_supervisor::config::ApiConfig;
use mcp_supervisor::{Result, Supervisor};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "supervisor.json".to_string());
    let supervisor = Supervisor::from_config_file(&config_path)?;

    let api_config = supervisor.api_config().cloned().unwrap_or(ApiConfig {
        address: "127.0.0.1".to_string(),
        port: 8085,
    });
    let api = ApiServer::start(supervisor.clone(), api_config).await?;
    println!(
        "Supervisor API listening on http://{}:{}",
        api.config().address,
        api.config().port
    );

    supervisor.start_all().await?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| mcp_supervisor::Error::Other(format!("Failed to wait for ctrl-c: {}", e)))?;
    println!("Shutting down");

    api.shutdown().await;
    supervisor.shutdown().await?;
    Ok(())
}
