//! The pure status state machine for supervised servers.
//!
//! Every mutation of a server's status goes through [`transition`], which
//! enforces the lifecycle transition table. Events not listed for the
//! current status are rejected with [`Error::InvalidTransition`] and cause
//! no state change; this is what prevents, for example, a stale probe
//! result from resurrecting a server the operator just stopped.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a supervised server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    /// Registered for a server launched outside the supervisor; awaiting
    /// its first probe.
    Initializing,
    /// Launch requested; process may be up but no probe has confirmed it.
    Starting,
    /// Last probe passed the health predicate.
    Running,
    /// Reachable, but the last probe breached the health predicate.
    Degraded,
    /// Stop requested; awaiting confirmed process exit.
    Stopping,
    /// Not running. The initial status on registration.
    Stopped,
    /// Process exited unexpectedly; `last_error` records the reason.
    Error,
    /// Process alive but repeatedly refusing probe connections.
    NotResponding,
    /// A probe hung past its deadline.
    Timeout,
    /// Operator-requested maintenance; probing and auto-restart suppressed.
    Maintenance,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerStatus::Initializing => "INITIALIZING",
            ServerStatus::Starting => "STARTING",
            ServerStatus::Running => "RUNNING",
            ServerStatus::Degraded => "DEGRADED",
            ServerStatus::Stopping => "STOPPING",
            ServerStatus::Stopped => "STOPPED",
            ServerStatus::Error => "ERROR",
            ServerStatus::NotResponding => "NOT_RESPONDING",
            ServerStatus::Timeout => "TIMEOUT",
            ServerStatus::Maintenance => "MAINTENANCE",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle events that drive status transitions.
///
/// Control requests, probe results, and process-exit notifications are all
/// expressed as events so that one transition function arbitrates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// Operator (or auto-restart policy) asked for the server to start.
    StartRequested,
    /// The process was spawned; its pid is now known. Probe has not yet
    /// confirmed the server, so the status stays STARTING.
    ProcessLaunched,
    /// A probe returned metrics that pass the health predicate.
    ProbePassed,
    /// A probe returned metrics that breach the health predicate.
    ProbeFailed,
    /// The probe itself did not return within its deadline.
    ProbeTimedOut,
    /// The probe connection was refused often enough to escalate.
    ProbeUnreachable,
    /// The process exited without a stop having been requested.
    ProcessExited,
    /// Operator asked for the server to stop.
    StopRequested,
    /// The process was confirmed exited after a stop request.
    StopConfirmed,
    /// Operator placed the server in maintenance.
    MaintenanceRequested,
    /// Operator cleared maintenance; `prior` is the status the server held
    /// when maintenance was entered (RUNNING or STOPPED).
    MaintenanceCleared { prior: ServerStatus },
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusEvent::StartRequested => "start-requested",
            StatusEvent::ProcessLaunched => "process-launched",
            StatusEvent::ProbePassed => "probe-passed",
            StatusEvent::ProbeFailed => "probe-failed",
            StatusEvent::ProbeTimedOut => "probe-timed-out",
            StatusEvent::ProbeUnreachable => "probe-unreachable",
            StatusEvent::ProcessExited => "process-exited",
            StatusEvent::StopRequested => "stop-requested",
            StatusEvent::StopConfirmed => "stop-confirmed",
            StatusEvent::MaintenanceRequested => "maintenance-requested",
            StatusEvent::MaintenanceCleared { .. } => "maintenance-cleared",
        };
        write!(f, "{}", s)
    }
}

/// Computes the status an event leads to from `current`, or `None` if the
/// transition table does not allow the event from that status.
pub fn next_status(current: ServerStatus, event: StatusEvent) -> Option<ServerStatus> {
    use ServerStatus::*;
    use StatusEvent::*;

    match (current, event) {
        (Stopped | Error, StartRequested) => Some(Starting),
        (Starting, ProcessLaunched) => Some(Starting),
        // First confirmation, or recovery after DEGRADED / TIMEOUT /
        // NOT_RESPONDING: a single passing probe always restores RUNNING.
        (Starting | Initializing | Degraded | Timeout | NotResponding, ProbePassed) => {
            Some(Running)
        }
        (Running, ProbeFailed) => Some(Degraded),
        (Running | Degraded | Starting, ProbeTimedOut) => Some(Timeout),
        (Running | Degraded | Timeout, ProbeUnreachable) => Some(NotResponding),
        (Starting | Running | Degraded | NotResponding | Timeout, ProcessExited) => Some(Error),
        (Stopped | Stopping, StopRequested) => None,
        (_, StopRequested) => Some(Stopping),
        (Stopping, StopConfirmed) => Some(Stopped),
        (Running | Stopped, MaintenanceRequested) => Some(Maintenance),
        (Maintenance, MaintenanceCleared { prior }) if matches!(prior, Running | Stopped) => {
            Some(prior)
        }
        _ => None,
    }
}

/// Applies `event` to `current`, producing the new status or an
/// [`Error::InvalidTransition`] naming the offending server.
pub fn transition(id: &str, current: ServerStatus, event: StatusEvent) -> Result<ServerStatus> {
    next_status(current, event).ok_or_else(|| Error::InvalidTransition {
        id: id.to_string(),
        from: current.to_string(),
        event: event.to_string(),
    })
}

/// Whether a status counts as healthy for fleet reporting.
///
/// MAINTENANCE, STARTING and INITIALIZING report healthy regardless of
/// metrics; a server stuck in STARTING indefinitely is therefore reported
/// healthy. Callers wanting liveness should consult [`is_active`] and the
/// metrics themselves.
pub fn is_healthy(status: ServerStatus) -> bool {
    matches!(
        status,
        ServerStatus::Running
            | ServerStatus::Starting
            | ServerStatus::Initializing
            | ServerStatus::Maintenance
    )
}

/// Whether a status counts as active (a process is, or is about to be,
/// doing work).
pub fn is_active(status: ServerStatus) -> bool {
    matches!(
        status,
        ServerStatus::Running
            | ServerStatus::Starting
            | ServerStatus::Initializing
            | ServerStatus::Degraded
            | ServerStatus::Maintenance
    )
}

/// Whether a status requires a live process handle.
///
/// The supervisor maintains the invariant that `pid` is recorded exactly
/// while the status is one of these.
pub fn requires_pid(status: ServerStatus) -> bool {
    matches!(
        status,
        ServerStatus::Starting
            | ServerStatus::Running
            | ServerStatus::Degraded
            | ServerStatus::Stopping
    )
}
