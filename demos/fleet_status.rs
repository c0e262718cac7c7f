//! Launches a small fleet and prints its status a few times.
//!
//! Run with: `cargo run --example fleet_status`

use mcp_supervisor::config::{Config, ServerConfig, ServerType};
use mcp_supervisor::{Result, Supervisor};
use std::collections::HashMap;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config {
        servers: vec![ServerConfig {
            id: "demo".to_string(),
            server_type: ServerType::Custom,
            command: "sleep".to_string(),
            args: vec!["60".to_string()],
            env: HashMap::new(),
            working_dir: None,
            port: 3001,
            health_endpoint: "/health".to_string(),
            probe_interval_secs: None,
        }],
        ..Config::default()
    };

    let supervisor = Supervisor::new(config)?;
    supervisor.start_all().await?;

    for _ in 0..5 {
        let status = supervisor.snapshot().await;
        println!(
            "host: cpu {:.1}%, {} processes",
            status.system.cpu_percent, status.system.process_count
        );
        for server in &status.servers {
            println!(
                "  {} [{}] pid={:?} healthy={} uptime={}s",
                server.config.id, server.status, server.pid, server.healthy, server.uptime_secs
            );
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    supervisor.shutdown().await?;
    Ok(())
}
