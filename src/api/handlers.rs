//! HTTP request handlers for the control API.
//!
//! This module contains the Actix Web handlers for the supervisor endpoints:
//! - `GET /status` for the consolidated fleet snapshot
//! - `GET /servers/{id}` for a single server's snapshot
//! - `POST /servers/{id}/start|stop|restart` for control operations

use crate::Supervisor;
use crate::api::types::ControlResponse;
use crate::error::Error;

use actix_web::{
    HttpResponse, Responder,
    web::{Data, Path},
};
use tracing;

/// Maps a supervisor error to the HTTP status the control API promises:
/// unknown server is 404, a transition the state machine rejects is 409,
/// and launch/stop failures are 500.
fn error_response(e: &Error) -> HttpResponse {
    let body = ControlResponse::failure(e.to_string());
    match e {
        Error::ServerNotFound(_) => HttpResponse::NotFound().json(body),
        Error::InvalidTransition { .. } => HttpResponse::Conflict().json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

/// Consolidated fleet snapshot: every server plus host resource usage.
pub async fn fleet_status(supervisor: Data<Supervisor>) -> impl Responder {
    tracing::debug!("Serving fleet status");
    let status = supervisor.snapshot().await;
    HttpResponse::Ok().json(status)
}

/// Snapshot of one server.
pub async fn server_status(supervisor: Data<Supervisor>, id: Path<String>) -> impl Responder {
    match supervisor.server_snapshot(&id).await {
        Ok(snapshot) => HttpResponse::Ok().json(snapshot),
        Err(e) => error_response(&e),
    }
}

/// Start a server.
pub async fn start_server(supervisor: Data<Supervisor>, id: Path<String>) -> impl Responder {
    tracing::info!(server = %id, "API start request");
    match supervisor.start(&id).await {
        Ok(()) => HttpResponse::Ok().json(ControlResponse::ok(format!("Server '{}' starting", id))),
        Err(e) => {
            tracing::warn!(server = %id, error = %e, "API start request failed");
            error_response(&e)
        }
    }
}

/// Stop a server.
pub async fn stop_server(supervisor: Data<Supervisor>, id: Path<String>) -> impl Responder {
    tracing::info!(server = %id, "API stop request");
    match supervisor.stop(&id).await {
        Ok(()) => HttpResponse::Ok().json(ControlResponse::ok(format!("Server '{}' stopped", id))),
        Err(e) => {
            tracing::warn!(server = %id, error = %e, "API stop request failed");
            error_response(&e)
        }
    }
}

/// Restart a server: stop, then start, atomically per server.
pub async fn restart_server(supervisor: Data<Supervisor>, id: Path<String>) -> impl Responder {
    tracing::info!(server = %id, "API restart request");
    match supervisor.restart(&id).await {
        Ok(()) => {
            HttpResponse::Ok().json(ControlResponse::ok(format!("Server '{}' restarting", id)))
        }
        Err(e) => {
            tracing::warn!(server = %id, error = %e, "API restart request failed");
            error_response(&e)
        }
    }
}
