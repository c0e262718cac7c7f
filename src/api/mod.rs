//! HTTP control/query API for the supervisor, built on Actix Web.
//!
//! The API is started by the embedding application and runs alongside the
//! supervisor; it exposes the fleet snapshot and the per-server control
//! operations. All handlers go through the [`Supervisor`], so the same
//! per-server ordering guarantees apply to API calls as to direct ones.
//!
//! # Example
//!
//! ```no_run
//! use mcp_supervisor::{Supervisor, api::ApiServer};
//! use mcp_supervisor::config::ApiConfig;
//!
//! # async fn run() -> mcp_supervisor::Result<()> {
//! let supervisor = Supervisor::from_config_file("supervisor.json")?;
//! let api_config = ApiConfig { address: "127.0.0.1".to_string(), port: 8085 };
//! let api = ApiServer::start(supervisor.clone(), api_config).await?;
//! // ... serve until shutdown ...
//! api.shutdown().await;
//! supervisor.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod handlers;
mod types;

pub use types::ControlResponse;

use crate::Supervisor;
use crate::config::ApiConfig;
use crate::error::{Error, Result};

use actix_cors::Cors;
use actix_web::{
    App, HttpServer, dev::ServerHandle, middleware,
    web::{self, Data},
};

use std::net::ToSocketAddrs;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing;

/// Handle for controlling a running API server.
///
/// Returned by [`ApiServer::start`]; the embedding application keeps it to
/// shut the API down cleanly.
#[derive(Clone)]
pub struct ApiHandle {
    /// Actix handle used to stop the server.
    server_handle: ServerHandle,
    /// Server task, joined on shutdown.
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// The bind settings the server was started with.
    config: ApiConfig,
}

impl ApiHandle {
    /// Gracefully stop the API server and wait for its task to finish.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down API server");
        self.server_handle.stop(true).await;

        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            match tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
                Ok(Err(e)) => tracing::warn!(error = %e, "Error while joining API server task"),
                Err(_) => tracing::warn!("Timeout waiting for API server task to finish"),
                Ok(Ok(())) => {}
            }
        }
    }

    /// The bind settings the server was started with.
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }
}

/// The supervisor's HTTP API server.
pub struct ApiServer;

impl ApiServer {
    /// Bind and start the API server, returning a handle for shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured address cannot be resolved or
    /// bound.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(supervisor, config), fields(address = %config.address, port = config.port))]
    pub async fn start(supervisor: Supervisor, config: ApiConfig) -> Result<ApiHandle> {
        let addr_str = format!("{}:{}", config.address, config.port);
        let addr = addr_str
            .to_socket_addrs()
            .map_err(|e| Error::Other(format!("Failed to parse socket address: {}", e)))?
            .next()
            .ok_or_else(|| {
                Error::Other(format!("Could not resolve socket address: {}", addr_str))
            })?;

        tracing::info!(address = %addr_str, "Starting supervisor API with Actix Web");

        let supervisor_data = Data::new(supervisor);
        let server = HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(middleware::Logger::default())
                .wrap(cors)
                .app_data(supervisor_data.clone())
                .route("/status", web::get().to(handlers::fleet_status))
                .route("/servers/{id}", web::get().to(handlers::server_status))
                .route(
                    "/servers/{id}/start",
                    web::post().to(handlers::start_server),
                )
                .route("/servers/{id}/stop", web::post().to(handlers::stop_server))
                .route(
                    "/servers/{id}/restart",
                    web::post().to(handlers::restart_server),
                )
        })
        .workers(2)
        .bind(addr)
        .map_err(|e| Error::Other(format!("Failed to bind API server: {}", e)))?
        .run();

        let server_handle = server.handle();
        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::error!(error = %e, "API server task error");
            }
        });

        tracing::info!("Supervisor API started successfully");
        Ok(ApiHandle {
            server_handle,
            task: Arc::new(Mutex::new(Some(task))),
            config,
        })
    }
}
