/*!
 # MCP Supervisor

 A Rust library for supervising fleets of Model Context Protocol (MCP)
 server processes.

 ## Overview

 MCP Supervisor provides functionality to:
 - Launch and terminate MCP server processes
 - Track each server through a well-defined lifecycle state machine
 - Probe server health endpoints on an interval, in parallel
 - Restart crashed servers automatically with exponential backoff
 - Serve a consolidated fleet-status view and control operations over HTTP

 ## Basic Usage

 ```no_run
 use mcp_supervisor::{Supervisor, Result};

 #[tokio::main]
 async fn main() -> Result<()> {
     // Create a supervisor from a config file; every configured server is
     // registered in STOPPED state.
     let supervisor = Supervisor::from_config_file("supervisor.json")?;

     // Start a specific server, or the whole fleet
     supervisor.start("fetch").await?;
     supervisor.start_all().await?;

     // Inspect the fleet
     let status = supervisor.snapshot().await;
     for server in &status.servers {
         println!("{}: {} (healthy: {})", server.config.id, server.status, server.healthy);
     }

     // Stop everything on the way out
     supervisor.shutdown().await?;
     Ok(())
 }
 ```

 ## Features

 - **Lifecycle State Machine**: every status change flows through one
   transition table; stale or conflicting events are rejected
 - **Health Monitoring**: per-server probe tasks with configurable
   interval, timeout, and escalation thresholds
 - **Automatic Restart**: exponential backoff with a capped attempt count
 - **Control API**: Actix Web endpoints for status and start/stop/restart
 - **Error Handling**: comprehensive error handling
 - **Async Support**: full async/await support

 ## License

 This project is licensed under the terms in the LICENSE file.
*/

pub mod api;
pub mod capability;
pub mod config;
pub mod error;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};
pub use server::{FullStatus, ServerSnapshot, ServerStatus};

use crate::config::{MonitorConfig, RestartConfig, ServerConfig};
use crate::server::events::{EventLog, LifecycleEvent, LifecycleEventKind};
use crate::server::info::{MaintenanceReturn, ServerInfo};
use crate::server::metrics::SystemStatus;
use crate::server::monitor::{
    HealthMonitor, HealthProbe, HttpHealthProbe, ProbeOutcome, ProbeReport,
};
use crate::server::process::{ExitEvent, ProcessController};
use crate::server::state::StatusEvent;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};
use sysinfo::System;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

/// Registry of managed servers and the coordination root for all control,
/// probe, and exit events.
///
/// This struct is the main entry point of the library. All mutations of a
/// single server's record are serialized through that server's lock, so a
/// control call racing a probe result or an exit notification can never
/// interleave into an inconsistent state.
/// All public methods are instrumented with `tracing` spans.
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    /// Self-reference handed to retry and pump tasks, so a task in flight
    /// never keeps the supervisor alive.
    weak: Weak<SupervisorInner>,
    /// Fleet-wide monitoring settings.
    monitor_config: MonitorConfig,
    /// Automatic-restart policy.
    restart_config: RestartConfig,
    /// Optional HTTP API bind settings.
    api_config: Option<config::ApiConfig>,
    /// Probe transport shared by all monitor tasks.
    probe: Arc<dyn HealthProbe>,
    /// The one process-wide shared structure: id -> server entry.
    registry: std::sync::RwLock<Registry>,
    /// Bounded lifecycle event log.
    events: EventLog,
    /// Sender handed to each launched process's exit watcher.
    exit_tx: mpsc::UnboundedSender<ExitEvent>,
    /// Sender handed to each server's monitor task.
    report_tx: mpsc::UnboundedSender<ProbeReport>,
    /// Host sampler for snapshot system blocks.
    system: std::sync::Mutex<System>,
    /// Event pump task, aborted on shutdown.
    pump_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<String, Arc<ServerEntry>>,
    /// Registration order, preserved in snapshots.
    order: Vec<String>,
}

/// One managed server: its lock-protected state plus the status feed its
/// monitor task watches.
struct ServerEntry {
    state: Mutex<EntryState>,
    status_tx: watch::Sender<(server::ServerStatus, u64)>,
}

struct EntryState {
    info: ServerInfo,
    controller: ProcessController,
    monitor: HealthMonitor,
    /// Automatic restart attempts since the last operator start or the
    /// last time RUNNING was reached.
    backoff_attempts: u32,
    /// Pending backoff retry, cancelled by any operator action.
    retry_task: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Create a supervisor from a configuration file path.
    ///
    /// Every server in the configuration is registered in STOPPED state.
    /// Must be called within a Tokio runtime; per-server monitor tasks are
    /// spawned immediately (they stay idle until the server starts).
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(path), fields(config_path = ?path.as_ref()))]
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        tracing::info!("Loading configuration from file");
        let config = Config::from_file(path)?;
        Self::new(config)
    }

    /// Create a supervisor from a JSON configuration string.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(config))]
    pub fn from_config_str(config: &str) -> Result<Self> {
        tracing::info!("Loading configuration from string");
        let config = Config::parse_from_str(config)?;
        Self::new(config)
    }

    /// Create a supervisor from a configuration, probing over HTTP.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(config), fields(num_servers = config.servers.len()))]
    pub fn new(config: Config) -> Result<Self> {
        Self::with_probe(config, Arc::new(HttpHealthProbe::new()))
    }

    /// Create a supervisor with a custom probe transport.
    ///
    /// Intended for tests and embedders that probe over something other
    /// than plain HTTP.
    pub fn with_probe(config: Config, probe: Arc<dyn HealthProbe>) -> Result<Self> {
        tracing::info!("Creating new Supervisor");
        config::validate_config(&config)?;

        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();

        let inner = Arc::new_cyclic(|weak| SupervisorInner {
            weak: weak.clone(),
            monitor_config: config.monitor.clone(),
            restart_config: config.restart.clone(),
            api_config: config.api.clone(),
            probe,
            registry: std::sync::RwLock::new(Registry::default()),
            events: EventLog::default(),
            exit_tx,
            report_tx,
            system: std::sync::Mutex::new(System::new()),
            pump_task: std::sync::Mutex::new(None),
        });

        let pump = SupervisorInner::spawn_pump(&inner, exit_rx, report_rx);
        *inner.pump_task.lock().expect("pump task lock poisoned") = Some(pump);

        let supervisor = Self { inner };
        for server_config in config.servers {
            supervisor.register(server_config)?;
        }
        Ok(supervisor)
    }

    /// Register a server, creating its record in STOPPED state.
    ///
    /// Fails with [`Error::DuplicateId`] if the id already exists.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self, server_config), fields(server_id = %server_config.id))]
    pub fn register(&self, server_config: ServerConfig) -> Result<()> {
        self.inner.register(server_config)
    }

    /// Remove a server from the registry.
    ///
    /// The server must be STOPPED; its monitor task and any pending retry
    /// are cancelled.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn deregister(&self, id: &str) -> Result<()> {
        self.inner.deregister(id).await
    }

    /// Start a registered server.
    ///
    /// Valid from STOPPED and ERROR. Resets the automatic-restart backoff
    /// and cancels any pending retry; the server moves to STARTING and
    /// reaches RUNNING once its first probe passes.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn start(&self, id: &str) -> Result<()> {
        tracing::info!("Attempting to start server");
        let entry = self.inner.entry(id)?;
        let mut st = entry.state.lock().await;
        self.inner.start_locked(&entry, &mut st, true).await
    }

    /// Stop a registered server.
    ///
    /// A graceful termination signal is sent first; if the process has not
    /// exited within the configured grace timeout it is killed. Stopping a
    /// server that is already STOPPED is a no-op success.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn stop(&self, id: &str) -> Result<()> {
        tracing::info!("Attempting to stop server");
        let entry = self.inner.entry(id)?;
        let mut st = entry.state.lock().await;
        self.inner.stop_locked(&entry, &mut st).await
    }

    /// Restart a registered server: stop, then start.
    ///
    /// The per-server lock is held across both halves, so no probe result
    /// or exit notification can interleave. If the stop fails, its error
    /// is surfaced and the start is not attempted.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn restart(&self, id: &str) -> Result<()> {
        tracing::info!("Attempting to restart server");
        let entry = self.inner.entry(id)?;
        let mut st = entry.state.lock().await;
        self.inner.stop_locked(&entry, &mut st).await?;
        self.inner.start_locked(&entry, &mut st, true).await?;
        self.inner
            .events
            .record(id, LifecycleEventKind::Restarted, None);
        Ok(())
    }

    /// Place a server in MAINTENANCE.
    ///
    /// Valid from RUNNING and STOPPED. While in maintenance, health
    /// probing and automatic restart are suppressed; a running process is
    /// left running.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn enter_maintenance(&self, id: &str) -> Result<()> {
        self.inner.enter_maintenance(id).await
    }

    /// Clear MAINTENANCE, restoring the state the server held when
    /// maintenance was entered (RUNNING or STOPPED) without relaunching.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn exit_maintenance(&self, id: &str) -> Result<()> {
        self.inner.exit_maintenance(id).await
    }

    /// Current status of one server.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn status(&self, id: &str) -> Result<server::ServerStatus> {
        let entry = self.inner.entry(id)?;
        let st = entry.state.lock().await;
        Ok(st.info.status)
    }

    /// Snapshot of one server's full record.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn server_snapshot(&self, id: &str) -> Result<ServerSnapshot> {
        let entry = self.inner.entry(id)?;
        let st = entry.state.lock().await;
        Ok(st.info.snapshot())
    }

    /// Consistent fleet snapshot plus host resource usage.
    ///
    /// Each server's record is read under its own lock, but no global
    /// lock is taken; slight skew across servers is acceptable for a
    /// monitoring view.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn snapshot(&self) -> FullStatus {
        self.inner.snapshot().await
    }

    /// Start every registered server, collecting failures.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn start_all(&self) -> Result<Vec<String>> {
        tracing::info!("Starting all registered servers");
        let ids = self.inner.ordered_ids();
        let mut started = Vec::new();
        let mut errors = Vec::new();

        for id in ids {
            match self.start(&id).await {
                Ok(()) => started.push(id),
                Err(e) => {
                    tracing::error!(server_id = %id, error = %e, "Failed to start server");
                    errors.push((id, e));
                }
            }
        }

        aggregate("start", started, errors)
    }

    /// Stop every registered server, collecting failures.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn stop_all(&self) -> Result<Vec<String>> {
        tracing::info!("Stopping all registered servers");
        let ids = self.inner.ordered_ids();
        let mut stopped = Vec::new();
        let mut errors = Vec::new();

        for id in ids {
            match self.stop(&id).await {
                Ok(()) => stopped.push(id),
                Err(e) => {
                    tracing::error!(server_id = %id, error = %e, "Failed to stop server");
                    errors.push((id, e));
                }
            }
        }

        aggregate("stop", stopped, errors)
    }

    /// Status of every registered server, keyed by id.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn all_statuses(&self) -> HashMap<String, server::ServerStatus> {
        let mut statuses = HashMap::new();
        for id in self.inner.ordered_ids() {
            if let Ok(status) = self.status(&id).await {
                statuses.insert(id, status);
            }
        }
        statuses
    }

    /// Recent lifecycle events across the fleet, newest first.
    pub fn recent_events(&self, limit: Option<usize>) -> Vec<LifecycleEvent> {
        self.inner.events.all_events(limit)
    }

    /// Recent lifecycle events for one server, newest first.
    pub fn server_events(&self, id: &str, limit: Option<usize>) -> Vec<LifecycleEvent> {
        self.inner.events.server_events(id, limit)
    }

    /// The configured HTTP API bind settings, if any.
    pub fn api_config(&self) -> Option<&config::ApiConfig> {
        self.inner.api_config.as_ref()
    }

    /// Stop every server and tear down monitor, retry, and pump tasks.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down supervisor");
        let result = self.stop_all().await.map(|_| ());

        for id in self.inner.ordered_ids() {
            if let Ok(entry) = self.inner.entry(&id) {
                let mut st = entry.state.lock().await;
                st.monitor.stop();
                if let Some(task) = st.retry_task.take() {
                    task.abort();
                }
            }
        }

        if let Some(pump) = self
            .inner
            .pump_task
            .lock()
            .expect("pump task lock poisoned")
            .take()
        {
            pump.abort();
        }

        result
    }
}

impl Clone for Supervisor {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Folds per-server successes and failures into one result: a single
/// failure passes through unchanged, multiple are joined into one message.
fn aggregate(
    operation: &str,
    succeeded: Vec<String>,
    mut errors: Vec<(String, Error)>,
) -> Result<Vec<String>> {
    if errors.is_empty() {
        return Ok(succeeded);
    }
    if errors.len() == 1 {
        return Err(errors.remove(0).1);
    }
    let joined = errors
        .iter()
        .map(|(id, e)| format!("{}: {}", id, e))
        .collect::<Vec<_>>()
        .join("; ");
    Err(Error::Other(format!(
        "Multiple servers failed to {}: {}",
        operation, joined
    )))
}

impl SupervisorInner {
    fn entry(&self, id: &str) -> Result<Arc<ServerEntry>> {
        self.registry
            .read()
            .expect("registry lock poisoned")
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ServerNotFound(id.to_string()))
    }

    fn ordered_ids(&self) -> Vec<String> {
        self.registry
            .read()
            .expect("registry lock poisoned")
            .order
            .clone()
    }

    /// Publishes the current (status, revision) pair to the monitor task.
    fn publish(entry: &ServerEntry, st: &EntryState) {
        let _ = entry.status_tx.send((st.info.status, st.info.revision));
    }

    fn register(&self, server_config: ServerConfig) -> Result<()> {
        config::validator::validate_server_config(&server_config)?;

        let mut registry = self.registry.write().expect("registry lock poisoned");
        if registry.entries.contains_key(&server_config.id) {
            return Err(Error::DuplicateId(server_config.id));
        }

        let server_config = Arc::new(server_config);
        let (status_tx, status_rx) = watch::channel((server::ServerStatus::Stopped, 0u64));

        let monitor = HealthMonitor::spawn(
            Arc::clone(&server_config),
            self.monitor_config.clone(),
            Arc::clone(&self.probe),
            status_rx,
            self.report_tx.clone(),
        );

        let mut info = ServerInfo::new(Arc::clone(&server_config));
        let capabilities = capability::capabilities_of(server_config.server_type)
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(",");
        info.metadata
            .insert("capabilities".to_string(), capabilities);
        info.metadata
            .insert("type".to_string(), server_config.server_type.to_string());

        let entry = Arc::new(ServerEntry {
            state: Mutex::new(EntryState {
                info,
                controller: ProcessController::new(Arc::clone(&server_config)),
                monitor,
                backoff_attempts: 0,
                retry_task: None,
            }),
            status_tx,
        });

        registry.order.push(server_config.id.clone());
        registry.entries.insert(server_config.id.clone(), entry);
        drop(registry);

        self.events
            .record(&server_config.id, LifecycleEventKind::Registered, None);
        tracing::info!(server = %server_config.id, "Server registered");
        Ok(())
    }

    async fn deregister(&self, id: &str) -> Result<()> {
        let entry = self.entry(id)?;
        {
            let mut st = entry.state.lock().await;
            if st.info.status != server::ServerStatus::Stopped {
                return Err(Error::InvalidTransition {
                    id: id.to_string(),
                    from: st.info.status.to_string(),
                    event: "deregister-requested".to_string(),
                });
            }
            st.monitor.stop();
            if let Some(task) = st.retry_task.take() {
                task.abort();
            }
        }

        let mut registry = self.registry.write().expect("registry lock poisoned");
        registry.entries.remove(id);
        registry.order.retain(|existing| existing != id);
        drop(registry);

        self.events
            .record(id, LifecycleEventKind::Deregistered, None);
        tracing::info!(server = %id, "Server deregistered");
        Ok(())
    }

    /// Starts the server while holding its lock.
    ///
    /// `operator` distinguishes an explicit control call (which resets the
    /// backoff counter and cancels pending retries) from an automatic
    /// restart attempt. On launch failure the record is rolled back to its
    /// prior state, with the revision kept monotonic.
    async fn start_locked(
        &self,
        entry: &ServerEntry,
        st: &mut EntryState,
        operator: bool,
    ) -> Result<()> {
        if operator {
            if let Some(task) = st.retry_task.take() {
                task.abort();
            }
            st.backoff_attempts = 0;
        }

        let prior = st.info.clone();
        st.info.apply(StatusEvent::StartRequested)?;
        Self::publish(entry, st);

        match st.controller.start(self.exit_tx.clone()).await {
            Ok(pid) => {
                st.info.record_launch(pid);
                st.info.apply(StatusEvent::ProcessLaunched)?;
                Self::publish(entry, st);
                self.events.record(
                    &st.info.config.id,
                    LifecycleEventKind::Started,
                    Some(format!("pid {}", pid)),
                );
                tracing::info!(server = %st.info.config.id, pid, "Server starting");
                Ok(())
            }
            Err(e) => {
                let revision = st.info.revision;
                st.info = prior;
                st.info.revision = revision;
                Self::publish(entry, st);
                tracing::error!(server = %st.info.config.id, error = %e, "Failed to launch server");
                Err(e)
            }
        }
    }

    /// Stops the server while holding its lock. Idempotent from STOPPED.
    async fn stop_locked(&self, entry: &ServerEntry, st: &mut EntryState) -> Result<()> {
        if let Some(task) = st.retry_task.take() {
            task.abort();
        }

        if st.info.status == server::ServerStatus::Stopped {
            tracing::debug!(server = %st.info.config.id, "Stop requested but already stopped");
            return Ok(());
        }

        let prior = st.info.clone();
        st.info.apply(StatusEvent::StopRequested)?;
        // A stop out of TIMEOUT / NOT_RESPONDING re-publishes the pid the
        // controller still holds for the STOPPING window.
        if st.info.pid.is_none() {
            st.info.pid = st.controller.pid();
        }
        Self::publish(entry, st);

        match st
            .controller
            .stop(self.restart_config.grace_timeout())
            .await
        {
            Ok(()) => {
                st.info.apply(StatusEvent::StopConfirmed)?;
                Self::publish(entry, st);
                self.events
                    .record(&st.info.config.id, LifecycleEventKind::Stopped, None);
                tracing::info!(server = %st.info.config.id, "Server stopped");
                Ok(())
            }
            Err(e) => {
                let revision = st.info.revision;
                st.info = prior;
                st.info.revision = revision;
                Self::publish(entry, st);
                tracing::error!(server = %st.info.config.id, error = %e, "Failed to stop server");
                Err(e)
            }
        }
    }

    async fn enter_maintenance(&self, id: &str) -> Result<()> {
        let entry = self.entry(id)?;
        let mut st = entry.state.lock().await;
        if let Some(task) = st.retry_task.take() {
            task.abort();
        }
        st.info.apply(StatusEvent::MaintenanceRequested)?;
        Self::publish(&entry, &st);
        self.events
            .record(id, LifecycleEventKind::MaintenanceEntered, None);
        tracing::info!(server = %id, "Server entered maintenance");
        Ok(())
    }

    async fn exit_maintenance(&self, id: &str) -> Result<()> {
        let entry = self.entry(id)?;
        let mut st = entry.state.lock().await;
        let prior = st
            .info
            .maintenance_return
            .map(|m| m.status)
            .unwrap_or(server::ServerStatus::Stopped);
        st.info.apply(StatusEvent::MaintenanceCleared { prior })?;
        Self::publish(&entry, &st);
        self.events
            .record(id, LifecycleEventKind::MaintenanceCleared, None);
        tracing::info!(server = %id, restored = %prior, "Server left maintenance");
        Ok(())
    }

    async fn snapshot(&self) -> FullStatus {
        let entries: Vec<Arc<ServerEntry>> = {
            let registry = self.registry.read().expect("registry lock poisoned");
            registry
                .order
                .iter()
                .filter_map(|id| registry.entries.get(id).cloned())
                .collect()
        };

        let mut servers = Vec::with_capacity(entries.len());
        for entry in entries {
            let st = entry.state.lock().await;
            servers.push(st.info.snapshot());
        }

        let system = {
            let mut system = self.system.lock().expect("system sampler lock poisoned");
            SystemStatus::sample(&mut system)
        };

        FullStatus {
            servers,
            system,
            timestamp: Utc::now(),
        }
    }

    fn spawn_pump(
        inner: &Arc<Self>,
        mut exit_rx: mpsc::UnboundedReceiver<ExitEvent>,
        mut report_rx: mpsc::UnboundedReceiver<ProbeReport>,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(inner);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_event = exit_rx.recv() => match maybe_event {
                        Some(event) => {
                            let Some(inner) = weak.upgrade() else { break };
                            inner.handle_exit(event).await;
                        }
                        None => break,
                    },
                    maybe_report = report_rx.recv() => match maybe_report {
                        Some(report) => {
                            let Some(inner) = weak.upgrade() else { break };
                            inner.handle_probe(report).await;
                        }
                        None => break,
                    },
                }
            }
        })
    }

    /// Applies an unsolicited process exit.
    ///
    /// Exits observed for a pid the supervisor no longer holds are stale:
    /// the stop path already confirmed them, or a newer process replaced
    /// them. The correlation consults the controller first: the published
    /// record keeps `pid` null in statuses such as TIMEOUT, NOT_RESPONDING
    /// and MAINTENANCE even while the process is alive, so the published
    /// pid alone cannot distinguish a stale exit from a real one.
    async fn handle_exit(&self, event: ExitEvent) {
        let Ok(entry) = self.entry(&event.id) else {
            return;
        };
        let mut st = entry.state.lock().await;

        let held_pid = st
            .controller
            .pid()
            .or(st.info.pid)
            .or(st.info.maintenance_return.and_then(|m| m.pid));
        if held_pid != Some(event.pid) {
            tracing::debug!(server = %event.id, pid = event.pid, "Discarding stale exit notification");
            return;
        }

        st.controller.forget();
        st.info.record_error(&event.reason);

        if st.info.status == server::ServerStatus::Maintenance {
            // The transition table has no exit row out of MAINTENANCE, and
            // auto-restart is suppressed there. Repoint the stash instead,
            // so clearing maintenance lands in STOPPED rather than
            // restoring a dead process's pid.
            st.info.maintenance_return = Some(MaintenanceReturn {
                status: server::ServerStatus::Stopped,
                pid: None,
                started_at: None,
            });
            self.events.record(
                &event.id,
                LifecycleEventKind::Failed,
                Some(event.reason.clone()),
            );
            tracing::warn!(server = %event.id, reason = %event.reason, "Server process exited during maintenance");
            return;
        }

        if let Err(e) = st.info.apply(StatusEvent::ProcessExited) {
            tracing::warn!(server = %event.id, error = %e, "Exit notification rejected by state machine");
            return;
        }
        Self::publish(&entry, &st);
        self.events.record(
            &event.id,
            LifecycleEventKind::Failed,
            Some(event.reason.clone()),
        );
        tracing::warn!(server = %event.id, reason = %event.reason, "Server process exited unexpectedly");

        self.schedule_retry(&mut st, &event.id);
    }

    /// Schedules the next automatic restart attempt, if any remain.
    fn schedule_retry(&self, st: &mut EntryState, id: &str) {
        let attempt = st.backoff_attempts;
        if attempt >= self.restart_config.max_attempts {
            tracing::warn!(
                server = %id,
                attempts = attempt,
                "Automatic restart attempts exhausted; operator action required"
            );
            return;
        }

        let delay = self.restart_config.delay_for_attempt(attempt);
        st.backoff_attempts = attempt + 1;
        let revision = st.info.revision;
        let weak = self.weak.clone();
        let id = id.to_string();

        tracing::info!(server = %id, attempt = attempt + 1, delay_secs = delay.as_secs(), "Scheduling automatic restart");
        st.retry_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else { return };
            inner.auto_restart(&id, revision).await;
        }));
    }

    /// Runs one scheduled restart attempt, unless the operator intervened
    /// since it was scheduled.
    async fn auto_restart(&self, id: &str, revision: u64) {
        let Ok(entry) = self.entry(id) else {
            return;
        };
        let mut st = entry.state.lock().await;

        if st.info.revision != revision || st.info.status != server::ServerStatus::Error {
            tracing::debug!(server = %id, "Automatic restart superseded; skipping");
            return;
        }

        tracing::info!(server = %id, attempt = st.backoff_attempts, "Attempting automatic restart");
        self.events.record(
            id,
            LifecycleEventKind::Restarted,
            Some(format!("automatic attempt {}", st.backoff_attempts)),
        );

        if let Err(e) = self.start_locked(&entry, &mut st, false).await {
            tracing::warn!(server = %id, error = %e, "Automatic restart failed");
            st.info.record_error(e.to_string());
            self.schedule_retry(&mut st, id);
        }
    }

    /// Applies a probe report delivered by a monitor task.
    ///
    /// Reports carry the revision observed at probe launch; a mismatch
    /// means the server transitioned while the probe was in flight and the
    /// result is dropped rather than applied.
    async fn handle_probe(&self, report: ProbeReport) {
        let Ok(entry) = self.entry(&report.id) else {
            return;
        };
        let mut st = entry.state.lock().await;

        if st.info.revision != report.revision {
            tracing::debug!(server = %report.id, "Discarding stale probe result");
            return;
        }

        let prior_status = st.info.status;
        match report.outcome {
            ProbeOutcome::Passing(health) => {
                st.info.record_probe(health.metrics);
                if let Some(version) = health.version {
                    st.info.version = version;
                }
                if prior_status != server::ServerStatus::Running {
                    if st.info.apply(StatusEvent::ProbePassed).is_ok() {
                        st.backoff_attempts = 0;
                        st.info.last_error = None;
                        // Recovery from TIMEOUT / NOT_RESPONDING published a
                        // null pid; RUNNING requires the live one back.
                        if st.info.pid.is_none() {
                            st.info.pid = st.controller.pid();
                        }
                        Self::publish(&entry, &st);
                        self.events.record(
                            &report.id,
                            LifecycleEventKind::StatusChanged,
                            Some(format!("{} -> RUNNING (probe passed)", prior_status)),
                        );
                        tracing::info!(server = %report.id, from = %prior_status, "Server confirmed running");
                    }
                }
            }
            ProbeOutcome::Failing(health) => {
                st.info.record_probe(health.metrics);
                if let Some(version) = health.version {
                    st.info.version = version;
                }
                if prior_status == server::ServerStatus::Running
                    && st.info.apply(StatusEvent::ProbeFailed).is_ok()
                {
                    Self::publish(&entry, &st);
                    self.events.record(
                        &report.id,
                        LifecycleEventKind::StatusChanged,
                        Some("RUNNING -> DEGRADED (health predicate breached)".to_string()),
                    );
                    tracing::warn!(server = %report.id, "Server degraded");
                }
            }
            ProbeOutcome::Unreachable => {
                st.info.last_health_check = Some(Utc::now());
                if st.info.apply(StatusEvent::ProbeUnreachable).is_ok() {
                    Self::publish(&entry, &st);
                    self.events.record(
                        &report.id,
                        LifecycleEventKind::StatusChanged,
                        Some(format!("{} -> NOT_RESPONDING", prior_status)),
                    );
                    tracing::warn!(server = %report.id, "Server not responding");
                }
            }
            ProbeOutcome::ProbeTimeout => {
                st.info.last_health_check = Some(Utc::now());
                if st.info.apply(StatusEvent::ProbeTimedOut).is_ok() {
                    Self::publish(&entry, &st);
                    self.events.record(
                        &report.id,
                        LifecycleEventKind::StatusChanged,
                        Some(format!("{} -> TIMEOUT", prior_status)),
                    );
                    tracing::warn!(server = %report.id, "Probe timed out");
                }
            }
        }
    }
}
