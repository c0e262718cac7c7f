//! Server supervision primitives for MCP Supervisor.
//!
//! This module holds the per-server building blocks the supervisor
//! orchestrates: the pure status state machine, the health data model, the
//! mutable per-server record, process control, health monitoring, and the
//! lifecycle event log.
//!
//! # Components
//!
//! * `state` - Valid statuses, the transition table, and health predicates
//! * `metrics` - Health samples and the host resource summary
//! * `info` - The versioned per-server record and snapshot types
//! * `process` - Launch, exit watching, and graceful termination
//! * `monitor` - Per-server probe tasks and the probe transport
//! * `events` - Bounded lifecycle event log
//!
//! # Examples
//!
//! Driving the state machine directly:
//!
//! ```
//! use mcp_supervisor::server::state::{self, ServerStatus, StatusEvent};
//!
//! let status = ServerStatus::Stopped;
//! let status = state::transition("demo", status, StatusEvent::StartRequested).unwrap();
//! assert_eq!(status, ServerStatus::Starting);
//! let status = state::transition("demo", status, StatusEvent::ProbePassed).unwrap();
//! assert_eq!(status, ServerStatus::Running);
//!
//! // A stale event is rejected without changing state:
//! assert!(state::transition("demo", ServerStatus::Stopped, StatusEvent::ProbeFailed).is_err());
//! ```
pub mod events;
pub mod info;
pub mod metrics;
pub mod monitor;
pub mod process;
pub mod state;

pub use events::{EventLog, LifecycleEvent, LifecycleEventKind};
pub use info::{FullStatus, MaintenanceReturn, ServerInfo, ServerSnapshot};
pub use metrics::{HealthMetrics, SystemStatus};
pub use monitor::{HealthMonitor, HealthProbe, HealthReport, HttpHealthProbe, ProbeOutcome, ProbeReport};
pub use process::{ExitEvent, ProcessController};
pub use state::{ServerStatus, StatusEvent};
