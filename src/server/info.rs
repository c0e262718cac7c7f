//! The mutable, versioned record kept for each registered server, plus the
//! serialized snapshot types served by the status API.

use crate::config::ServerConfig;
use crate::error::Result;
use crate::server::metrics::{HealthMetrics, SystemStatus};
use crate::server::state::{self, ServerStatus, StatusEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// The supervisor's record of one registered server.
///
/// All mutation happens under the server's per-id lock and flows through
/// [`ServerInfo::apply`], which enforces the transition table and bumps the
/// `revision` counter used to discard stale probe results.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Static launch/probe configuration; immutable after registration.
    pub config: Arc<ServerConfig>,
    /// Current lifecycle status.
    pub status: ServerStatus,
    /// OS process id, set exactly while the status requires a live process.
    pub pid: Option<u32>,
    /// When the current process was launched.
    pub started_at: Option<DateTime<Utc>>,
    /// When the last probe completed, pass or fail.
    pub last_health_check: Option<DateTime<Utc>>,
    /// Server software version, as reported by its health endpoint.
    pub version: String,
    /// Free-form annotations (capabilities, operator notes).
    pub metadata: HashMap<String, String>,
    /// Latest probe sample; `None` until the first reachable probe.
    pub metrics: Option<HealthMetrics>,
    /// Reason for the most recent failure; present only in failure states.
    pub last_error: Option<String>,
    /// Monotonic transition counter. Work started against an older
    /// revision must be discarded rather than applied.
    pub revision: u64,
    /// Status and process handle to restore when maintenance is cleared.
    pub maintenance_return: Option<MaintenanceReturn>,
}

/// What a server goes back to when maintenance is cleared.
///
/// The published record keeps `pid` null during MAINTENANCE, but the
/// process itself may still be running; the handle is stashed here so
/// clearing maintenance restores RUNNING without relaunching.
#[derive(Debug, Clone, Copy)]
pub struct MaintenanceReturn {
    /// Status held when maintenance was entered (RUNNING or STOPPED).
    pub status: ServerStatus,
    /// Process id at that time, if any.
    pub pid: Option<u32>,
    /// Launch time at that time, if any.
    pub started_at: Option<DateTime<Utc>>,
}

impl ServerInfo {
    /// Creates the record for a freshly registered server, in STOPPED.
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            config,
            status: ServerStatus::Stopped,
            pid: None,
            started_at: None,
            last_health_check: None,
            version: "unknown".to_string(),
            metadata: HashMap::new(),
            metrics: None,
            last_error: None,
            revision: 0,
            maintenance_return: None,
        }
    }

    /// Applies a lifecycle event, updating status and revision.
    ///
    /// Rejected events leave the record untouched. On a successful
    /// transition the pid is cleared whenever the new status no longer
    /// requires a live process, keeping the pid/status invariant local to
    /// this one method.
    pub fn apply(&mut self, event: StatusEvent) -> Result<ServerStatus> {
        let new_status = state::transition(&self.config.id, self.status, event)?;

        match event {
            StatusEvent::MaintenanceRequested => {
                self.maintenance_return = Some(MaintenanceReturn {
                    status: self.status,
                    pid: self.pid,
                    started_at: self.started_at,
                });
            }
            StatusEvent::MaintenanceCleared { .. } => {
                if let Some(stash) = self.maintenance_return.take() {
                    self.pid = stash.pid;
                    self.started_at = stash.started_at;
                }
            }
            StatusEvent::StartRequested => {
                // A fresh start clears the residue of the previous failure.
                self.last_error = None;
                self.metrics = None;
            }
            StatusEvent::StopRequested => {
                // Stopping out of maintenance abandons the stashed return
                // state; the process is about to be terminated anyway.
                self.maintenance_return = None;
            }
            _ => {}
        }

        self.status = new_status;
        self.revision += 1;

        if !state::requires_pid(new_status) {
            self.pid = None;
            // TIMEOUT and NOT_RESPONDING keep the launch time: the process
            // is still believed alive and a single passing probe restores
            // RUNNING. Uptime reads zero meanwhile because pid is unset.
            if !matches!(
                new_status,
                ServerStatus::Timeout | ServerStatus::NotResponding
            ) {
                self.started_at = None;
            }
        }

        Ok(new_status)
    }

    /// Records the pid and launch time of a spawned process.
    pub fn record_launch(&mut self, pid: u32) {
        self.pid = Some(pid);
        self.started_at = Some(Utc::now());
    }

    /// Records the outcome of a reachable probe without transitioning.
    pub fn record_probe(&mut self, metrics: HealthMetrics) {
        self.metrics = Some(metrics);
        self.last_health_check = Some(Utc::now());
    }

    /// Records the reason for an unsolicited failure.
    pub fn record_error(&mut self, reason: impl Into<String>) {
        self.last_error = Some(reason.into());
    }

    /// Uptime of the current process; zero while no process is held.
    pub fn uptime(&self) -> Duration {
        match (self.pid, self.started_at) {
            (Some(_), Some(started)) => (Utc::now() - started)
                .to_std()
                .unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        }
    }

    /// Overall health: healthy status, passing metrics (or none yet), and
    /// no recorded error.
    pub fn is_healthy(&self) -> bool {
        state::is_healthy(self.status)
            && self.metrics.is_none_or(|m| m.is_passing())
            && self.last_error.is_none()
    }

    /// Immutable serialized view of this record.
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            config: (*self.config).clone(),
            status: self.status,
            pid: self.pid,
            start_time: self.started_at,
            last_health_check: self.last_health_check,
            version: self.version.clone(),
            metadata: self.metadata.clone(),
            health_metrics: self.metrics,
            error_message: self.last_error.clone(),
            uptime_secs: self.uptime().as_secs(),
            healthy: self.is_healthy(),
        }
    }
}

/// Serialized view of one server, as served by `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSnapshot {
    /// The registered configuration.
    pub config: ServerConfig,
    /// Current status.
    pub status: ServerStatus,
    /// OS process id, when a process is believed alive.
    pub pid: Option<u32>,
    /// Launch time of the current process.
    pub start_time: Option<DateTime<Utc>>,
    /// Completion time of the last probe.
    pub last_health_check: Option<DateTime<Utc>>,
    /// Reported server version.
    pub version: String,
    /// Free-form annotations.
    pub metadata: HashMap<String, String>,
    /// Latest probe sample.
    pub health_metrics: Option<HealthMetrics>,
    /// Failure reason, present only in failure states.
    pub error_message: Option<String>,
    /// Seconds the current process has been up.
    pub uptime_secs: u64,
    /// Overall health verdict.
    pub healthy: bool,
}

/// Ordered fleet snapshot: every server, the host resource summary, and
/// the time the snapshot was assembled. Produced fresh on each query and
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullStatus {
    /// Per-server snapshots, in registration order.
    pub servers: Vec<ServerSnapshot>,
    /// Host resource usage.
    pub system: SystemStatus,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}
