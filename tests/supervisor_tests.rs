//! End-to-end supervisor tests driven by a scripted probe transport and
//! real short-lived processes.

use async_trait::async_trait;
use mcp_supervisor::config::{Config, MonitorConfig, RestartConfig, ServerConfig, ServerType};
use mcp_supervisor::server::{
    HealthMetrics, HealthProbe, HealthReport, LifecycleEventKind, ProbeOutcome,
};
use mcp_supervisor::{Error, ServerStatus, Supervisor};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Probe transport that replays a scripted outcome sequence, then repeats
/// a default outcome forever.
struct ScriptedProbe {
    script: Mutex<VecDeque<ProbeOutcome>>,
    default: ProbeOutcome,
}

impl ScriptedProbe {
    fn new(script: Vec<ProbeOutcome>, default: ProbeOutcome) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default,
        }
    }

    fn always(default: ProbeOutcome) -> Self {
        Self::new(Vec::new(), default)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, _url: &str, _timeout: Duration) -> ProbeOutcome {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

fn passing() -> ProbeOutcome {
    ProbeOutcome::Passing(HealthReport {
        metrics: HealthMetrics::default(),
        version: Some("1.2.3".to_string()),
    })
}

fn failing() -> ProbeOutcome {
    ProbeOutcome::Failing(HealthReport {
        metrics: HealthMetrics {
            cpu_percent: 97.0,
            ..HealthMetrics::default()
        },
        version: None,
    })
}

fn server(id: &str, port: u16, sleep_secs: &str) -> ServerConfig {
    ServerConfig {
        id: id.to_string(),
        server_type: ServerType::Custom,
        command: "sleep".to_string(),
        args: vec![sleep_secs.to_string()],
        env: HashMap::new(),
        working_dir: None,
        port,
        health_endpoint: "/health".to_string(),
        probe_interval_secs: None,
    }
}

fn fleet(servers: Vec<ServerConfig>, max_attempts: u32) -> Config {
    Config {
        servers,
        monitor: MonitorConfig {
            probe_interval_secs: 1,
            probe_timeout_secs: 1,
            max_unreachable: 3,
        },
        restart: RestartConfig {
            base_delay_secs: 1,
            max_delay_secs: 2,
            max_attempts,
            grace_timeout_secs: 2,
        },
        api: None,
    }
}

async fn wait_for<F>(mut condition: F, secs: u64) -> bool
where
    F: AsyncFnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(secs);
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

async fn wait_for_status(supervisor: &Supervisor, id: &str, want: ServerStatus, secs: u64) -> bool {
    wait_for(
        async || supervisor.status(id).await.is_ok_and(|s| s == want),
        secs,
    )
    .await
}

#[tokio::test]
async fn test_register_start_run_stop_lifecycle() {
    let config = fleet(vec![server("lifecycle", 42001, "30")], 3);
    let supervisor =
        Supervisor::with_probe(config, Arc::new(ScriptedProbe::always(passing()))).unwrap();

    // Registered servers begin STOPPED
    assert_eq!(
        supervisor.status("lifecycle").await.unwrap(),
        ServerStatus::Stopped
    );

    supervisor.start("lifecycle").await.unwrap();
    assert_eq!(
        supervisor.status("lifecycle").await.unwrap(),
        ServerStatus::Starting
    );
    let snapshot = supervisor.server_snapshot("lifecycle").await.unwrap();
    assert!(snapshot.pid.is_some(), "STARTING must carry a pid");

    // First passing probe confirms RUNNING and records the version
    assert!(wait_for_status(&supervisor, "lifecycle", ServerStatus::Running, 10).await);
    let snapshot = supervisor.server_snapshot("lifecycle").await.unwrap();
    assert!(snapshot.healthy);
    assert_eq!(snapshot.version, "1.2.3");
    assert!(snapshot.last_health_check.is_some());
    assert_eq!(snapshot.metadata.get("type").map(String::as_str), Some("custom"));

    supervisor.stop("lifecycle").await.unwrap();
    assert_eq!(
        supervisor.status("lifecycle").await.unwrap(),
        ServerStatus::Stopped
    );
    let snapshot = supervisor.server_snapshot("lifecycle").await.unwrap();
    assert!(snapshot.pid.is_none(), "STOPPED must not carry a pid");

    // The event log saw the whole lifecycle
    let kinds: Vec<LifecycleEventKind> = supervisor
        .server_events("lifecycle", None)
        .iter()
        .map(|e| e.kind)
        .collect();
    assert!(kinds.contains(&LifecycleEventKind::Registered));
    assert!(kinds.contains(&LifecycleEventKind::Started));
    assert!(kinds.contains(&LifecycleEventKind::Stopped));

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_on_stopped_is_noop_and_double_start_conflicts() {
    let config = fleet(vec![server("idem", 42003, "30")], 3);
    let supervisor =
        Supervisor::with_probe(config, Arc::new(ScriptedProbe::always(passing()))).unwrap();

    // Stopping a server that never started succeeds without effect
    supervisor.stop("idem").await.unwrap();
    assert_eq!(supervisor.status("idem").await.unwrap(), ServerStatus::Stopped);

    // A second start while STARTING is rejected by the state machine
    supervisor.start("idem").await.unwrap();
    let err = supervisor.start("idem").await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }), "got: {}", err);

    // Unknown ids are their own error, not a transition failure
    let err = supervisor.start("missing").await.unwrap_err();
    assert!(matches!(err, Error::ServerNotFound(_)), "got: {}", err);

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failing_probe_degrades_then_single_pass_recovers() {
    let probe = ScriptedProbe::new(vec![passing(), failing()], passing());
    let config = fleet(vec![server("degrade", 42005, "30")], 3);
    let supervisor = Supervisor::with_probe(config, Arc::new(probe)).unwrap();

    supervisor.start("degrade").await.unwrap();
    assert!(wait_for_status(&supervisor, "degrade", ServerStatus::Running, 10).await);

    // The scripted failing sample breaches the predicate
    assert!(wait_for_status(&supervisor, "degrade", ServerStatus::Degraded, 10).await);
    let snapshot = supervisor.server_snapshot("degrade").await.unwrap();
    assert!(!snapshot.healthy);
    assert!(snapshot.pid.is_some(), "DEGRADED keeps its process");

    // One passing probe is enough to recover
    assert!(wait_for_status(&supervisor, "degrade", ServerStatus::Running, 10).await);

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unexpected_exit_reaches_error_then_auto_restarts() {
    // The process exits on its own after one second
    let config = fleet(vec![server("crashy", 42007, "1")], 3);
    let supervisor =
        Supervisor::with_probe(config, Arc::new(ScriptedProbe::always(passing()))).unwrap();

    supervisor.start("crashy").await.unwrap();
    assert!(wait_for_status(&supervisor, "crashy", ServerStatus::Error, 10).await);
    let snapshot = supervisor.server_snapshot("crashy").await.unwrap();
    assert!(snapshot.error_message.is_some());
    assert!(snapshot.pid.is_none(), "ERROR must not carry a pid");

    // Backoff kicks in and relaunches without operator involvement
    assert!(
        wait_for(
            async || {
                let status = supervisor.status("crashy").await.unwrap();
                matches!(status, ServerStatus::Starting | ServerStatus::Running)
            },
            10
        )
        .await
    );
    let kinds: Vec<LifecycleEventKind> = supervisor
        .server_events("crashy", None)
        .iter()
        .map(|e| e.kind)
        .collect();
    assert!(kinds.contains(&LifecycleEventKind::Failed));
    assert!(kinds.contains(&LifecycleEventKind::Restarted));

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exhausted_backoff_leaves_error_until_operator_start() {
    // max_attempts 0: no automatic restart at all
    let config = fleet(vec![server("manual", 42009, "1")], 0);
    let supervisor =
        Supervisor::with_probe(config, Arc::new(ScriptedProbe::always(passing()))).unwrap();

    supervisor.start("manual").await.unwrap();
    assert!(wait_for_status(&supervisor, "manual", ServerStatus::Error, 10).await);

    // Stays in ERROR; no retry is scheduled
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(supervisor.status("manual").await.unwrap(), ServerStatus::Error);

    // An explicit start is still valid from ERROR
    supervisor.start("manual").await.unwrap();
    assert_eq!(
        supervisor.status("manual").await.unwrap(),
        ServerStatus::Starting
    );

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_maintenance_suppresses_probing_and_restores_prior_state() {
    let config = fleet(vec![server("maint", 42011, "30")], 3);
    let supervisor =
        Supervisor::with_probe(config, Arc::new(ScriptedProbe::always(failing()))).unwrap();

    // From STOPPED: enter and leave maintenance without a process
    supervisor.enter_maintenance("maint").await.unwrap();
    assert_eq!(
        supervisor.status("maint").await.unwrap(),
        ServerStatus::Maintenance
    );
    supervisor.exit_maintenance("maint").await.unwrap();
    assert_eq!(supervisor.status("maint").await.unwrap(), ServerStatus::Stopped);

    // Starting is not a valid maintenance entry point
    supervisor.start("maint").await.unwrap();
    let err = supervisor.enter_maintenance("maint").await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }), "got: {}", err);

    // Reaching RUNNING needs a passing probe; rebuild the fleet with one.
    supervisor.shutdown().await.unwrap();

    let config = fleet(vec![server("maint", 42011, "30")], 3);
    let supervisor =
        Supervisor::with_probe(config, Arc::new(ScriptedProbe::always(passing()))).unwrap();
    supervisor.start("maint").await.unwrap();
    assert!(wait_for_status(&supervisor, "maint", ServerStatus::Running, 10).await);

    supervisor.enter_maintenance("maint").await.unwrap();
    let snapshot = supervisor.server_snapshot("maint").await.unwrap();
    assert_eq!(snapshot.status, ServerStatus::Maintenance);
    assert!(snapshot.pid.is_none(), "MAINTENANCE publishes no pid");

    // Probes are suppressed; the failing default never demotes it
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(
        supervisor.status("maint").await.unwrap(),
        ServerStatus::Maintenance
    );

    // Clearing maintenance restores RUNNING with the stashed process
    supervisor.exit_maintenance("maint").await.unwrap();
    let snapshot = supervisor.server_snapshot("maint").await.unwrap();
    assert_eq!(snapshot.status, ServerStatus::Running);
    assert!(snapshot.pid.is_some());

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restart_holds_the_entry_and_relaunches() {
    let config = fleet(vec![server("bounce", 42013, "30")], 3);
    let supervisor =
        Supervisor::with_probe(config, Arc::new(ScriptedProbe::always(passing()))).unwrap();

    supervisor.start("bounce").await.unwrap();
    assert!(wait_for_status(&supervisor, "bounce", ServerStatus::Running, 10).await);
    let first_pid = supervisor.server_snapshot("bounce").await.unwrap().pid;

    supervisor.restart("bounce").await.unwrap();
    let status = supervisor.status("bounce").await.unwrap();
    assert!(
        matches!(status, ServerStatus::Starting | ServerStatus::Running),
        "got: {}",
        status
    );
    let second_pid = supervisor.server_snapshot("bounce").await.unwrap().pid;
    assert!(second_pid.is_some());
    assert_ne!(first_pid, second_pid);

    assert!(wait_for_status(&supervisor, "bounce", ServerStatus::Running, 10).await);
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_deregister_requires_stopped() {
    let config = fleet(vec![server("leaver", 42015, "30")], 3);
    let supervisor =
        Supervisor::with_probe(config, Arc::new(ScriptedProbe::always(passing()))).unwrap();

    supervisor.start("leaver").await.unwrap();
    let err = supervisor.deregister("leaver").await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }), "got: {}", err);

    supervisor.stop("leaver").await.unwrap();
    supervisor.deregister("leaver").await.unwrap();
    let err = supervisor.status("leaver").await.unwrap_err();
    assert!(matches!(err, Error::ServerNotFound(_)), "got: {}", err);

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_repeated_unreachable_escalates_to_not_responding() {
    // One confirming probe, then every probe has its connection refused
    let probe = ScriptedProbe::new(vec![passing()], ProbeOutcome::Unreachable);
    let config = fleet(vec![server("refused", 42023, "30")], 0);
    let supervisor = Supervisor::with_probe(config, Arc::new(probe)).unwrap();

    supervisor.start("refused").await.unwrap();
    assert!(wait_for_status(&supervisor, "refused", ServerStatus::Running, 10).await);

    // Three consecutive refusals escalate; the process itself is still up
    assert!(wait_for_status(&supervisor, "refused", ServerStatus::NotResponding, 15).await);
    let snapshot = supervisor.server_snapshot("refused").await.unwrap();
    assert!(snapshot.pid.is_none(), "NOT_RESPONDING publishes no pid");
    assert!(!snapshot.healthy);

    // A stop from NOT_RESPONDING still reaches the live process
    supervisor.stop("refused").await.unwrap();
    assert_eq!(
        supervisor.status("refused").await.unwrap(),
        ServerStatus::Stopped
    );

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exit_while_timed_out_reaches_error() {
    // Confirm RUNNING once, then every probe hangs; the process dies on
    // its own after the server has already escalated to TIMEOUT
    let probe = ScriptedProbe::new(vec![passing()], ProbeOutcome::ProbeTimeout);
    let config = fleet(vec![server("hung", 42025, "4")], 0);
    let supervisor = Supervisor::with_probe(config, Arc::new(probe)).unwrap();

    supervisor.start("hung").await.unwrap();
    assert!(wait_for_status(&supervisor, "hung", ServerStatus::Running, 10).await);
    assert!(wait_for_status(&supervisor, "hung", ServerStatus::Timeout, 10).await);

    // The exit notification must still be correlated even though TIMEOUT
    // publishes no pid
    assert!(wait_for_status(&supervisor, "hung", ServerStatus::Error, 15).await);
    let snapshot = supervisor.server_snapshot("hung").await.unwrap();
    assert!(snapshot.error_message.is_some());
    assert!(snapshot.pid.is_none(), "ERROR must not carry a pid");

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exit_during_maintenance_clears_to_stopped() {
    let config = fleet(vec![server("drained", 42027, "3")], 3);
    let supervisor =
        Supervisor::with_probe(config, Arc::new(ScriptedProbe::always(passing()))).unwrap();

    supervisor.start("drained").await.unwrap();
    assert!(wait_for_status(&supervisor, "drained", ServerStatus::Running, 10).await);
    supervisor.enter_maintenance("drained").await.unwrap();

    // The process dies while in maintenance: the reason is recorded but
    // the status holds until the operator clears it
    assert!(
        wait_for(
            async || {
                let snapshot = supervisor.server_snapshot("drained").await.unwrap();
                snapshot.error_message.is_some()
            },
            15
        )
        .await
    );
    assert_eq!(
        supervisor.status("drained").await.unwrap(),
        ServerStatus::Maintenance
    );

    // Clearing maintenance must not resurrect the dead process's pid
    supervisor.exit_maintenance("drained").await.unwrap();
    let snapshot = supervisor.server_snapshot("drained").await.unwrap();
    assert_eq!(snapshot.status, ServerStatus::Stopped);
    assert!(snapshot.pid.is_none());
    assert!(snapshot.error_message.is_some());

    let kinds: Vec<LifecycleEventKind> = supervisor
        .server_events("drained", None)
        .iter()
        .map(|e| e.kind)
        .collect();
    assert!(kinds.contains(&LifecycleEventKind::Failed));

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_fleet_operations_and_snapshot() {
    let config = fleet(
        vec![server("alpha", 42017, "30"), server("beta", 42019, "30")],
        3,
    );
    let supervisor =
        Supervisor::with_probe(config, Arc::new(ScriptedProbe::always(passing()))).unwrap();

    let started = supervisor.start_all().await.unwrap();
    assert_eq!(started, vec!["alpha".to_string(), "beta".to_string()]);

    let status = supervisor.snapshot().await;
    // Registration order is preserved
    assert_eq!(status.servers.len(), 2);
    assert_eq!(status.servers[0].config.id, "alpha");
    assert_eq!(status.servers[1].config.id, "beta");
    assert!(status.system.memory_total > 0);

    // Duplicate registration is refused
    let err = supervisor.register(server("alpha", 42021, "30")).unwrap_err();
    assert!(matches!(err, Error::DuplicateId(_)), "got: {}", err);

    let stopped = supervisor.stop_all().await.unwrap();
    assert_eq!(stopped.len(), 2);
    for snapshot in supervisor.snapshot().await.servers {
        assert_eq!(snapshot.status, ServerStatus::Stopped);
    }

    supervisor.shutdown().await.unwrap();
}
