//! Health monitoring for supervised servers.
//!
//! Each registered server gets its own probe task so that a slow or hung
//! endpoint never delays probing of the rest of the fleet. The task watches
//! the server's published status to suppress probing in STOPPED, STOPPING
//! and MAINTENANCE, applies the escalation policy (consecutive refusals,
//! immediate timeout), and delivers revision-tagged reports to the
//! supervisor, which applies them under the per-server lock.

use crate::config::{MonitorConfig, ServerConfig};
use crate::server::metrics::HealthMetrics;
use crate::server::state::ServerStatus;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What one probe observed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// Server reachable and the sample passes the health predicate.
    Passing(HealthReport),
    /// Server reachable but the sample breaches the health predicate.
    Failing(HealthReport),
    /// Connection refused or reset.
    Unreachable,
    /// The probe did not return within its deadline.
    ProbeTimeout,
}

/// Decoded body of a reachable probe.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    /// The health sample.
    pub metrics: HealthMetrics,
    /// Server software version, when the endpoint reports one.
    pub version: Option<String>,
}

/// A probe result as delivered to the supervisor.
///
/// `revision` is the server's transition revision observed when the probe
/// was launched; the supervisor discards the report if the server has
/// transitioned since, so a late-arriving result can never clobber newer
/// state.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// Target server id.
    pub id: String,
    /// Revision observed at probe launch.
    pub revision: u64,
    /// What the probe observed.
    pub outcome: ProbeOutcome,
}

/// Wire shape of the health endpoint's JSON document.
///
/// Servers report metrics fields at the top level plus an optional version;
/// everything is optional so a bare `{}` decodes as an all-clear sample.
#[derive(Debug, Deserialize)]
struct HealthDocument {
    #[serde(flatten)]
    metrics: HealthMetrics,
    version: Option<String>,
}

/// Transport used to issue one probe. Behind a trait so tests can script
/// outcomes without a live server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Issue a single bounded-timeout probe against `url`.
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome;
}

/// HTTP probe transport backed by `reqwest`.
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    /// Create the probe transport with a shared connection pool.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return ProbeOutcome::ProbeTimeout,
            Err(_) => return ProbeOutcome::Unreachable,
        };

        let reachable_ok = response.status().is_success();
        let report = match response.json::<HealthDocument>().await {
            Ok(doc) => HealthReport {
                metrics: doc.metrics,
                version: doc.version,
            },
            Err(e) if e.is_timeout() => return ProbeOutcome::ProbeTimeout,
            // Reachable but unintelligible counts against the server, not
            // the transport.
            Err(_) => {
                return ProbeOutcome::Failing(HealthReport {
                    metrics: HealthMetrics::default(),
                    version: None,
                });
            }
        };

        if reachable_ok && report.metrics.is_passing() {
            ProbeOutcome::Passing(report)
        } else {
            ProbeOutcome::Failing(report)
        }
    }
}

/// Handle to one server's probe task.
pub struct HealthMonitor {
    task: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Spawn the probe loop for one server.
    ///
    /// `status_rx` carries the server's current (status, revision) pair as
    /// published by the supervisor; `report_tx` receives the filtered
    /// probe reports.
    pub fn spawn(
        config: Arc<ServerConfig>,
        monitor_config: MonitorConfig,
        probe: Arc<dyn HealthProbe>,
        status_rx: watch::Receiver<(ServerStatus, u64)>,
        report_tx: UnboundedSender<ProbeReport>,
    ) -> Self {
        let task = tokio::spawn(Self::run(
            config,
            monitor_config,
            probe,
            status_rx,
            report_tx,
        ));
        Self { task: Some(task) }
    }

    /// Stop the probe task.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    async fn run(
        config: Arc<ServerConfig>,
        monitor_config: MonitorConfig,
        probe: Arc<dyn HealthProbe>,
        status_rx: watch::Receiver<(ServerStatus, u64)>,
        report_tx: UnboundedSender<ProbeReport>,
    ) {
        let interval_duration = config
            .probe_interval_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| monitor_config.probe_interval());
        let timeout = monitor_config.probe_timeout();
        let url = config.probe_url();

        let mut interval = tokio::time::interval(interval_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut consecutive_unreachable: u32 = 0;

        loop {
            interval.tick().await;

            let (status, revision) = *status_rx.borrow();
            if matches!(
                status,
                ServerStatus::Stopped | ServerStatus::Stopping | ServerStatus::Maintenance
            ) {
                consecutive_unreachable = 0;
                continue;
            }

            let outcome = probe.probe(&url, timeout).await;
            tracing::trace!(server = %config.id, status = %status, outcome = ?outcome, "Probe completed");

            if matches!(outcome, ProbeOutcome::Unreachable) {
                consecutive_unreachable += 1;
            } else {
                consecutive_unreachable = 0;
            }

            if !Self::should_deliver(
                status,
                &outcome,
                consecutive_unreachable,
                monitor_config.max_unreachable,
            ) {
                continue;
            }

            let report = ProbeReport {
                id: config.id.clone(),
                revision,
                outcome,
            };
            if report_tx.send(report).is_err() {
                // Supervisor gone; nothing left to report to.
                break;
            }
        }
    }

    /// Whether an outcome should reach the supervisor, given the status
    /// observed at probe launch.
    ///
    /// This is the escalation policy: refusals must repeat before they
    /// matter, a hang matters immediately, and outcomes that could not
    /// produce a legal transition are filtered here rather than tripping
    /// `InvalidTransition` downstream.
    fn should_deliver(
        status: ServerStatus,
        outcome: &ProbeOutcome,
        consecutive_unreachable: u32,
        max_unreachable: u32,
    ) -> bool {
        use ServerStatus::*;

        match outcome {
            // Running gets its metrics refreshed; the rest transition.
            ProbeOutcome::Passing(_) => matches!(
                status,
                Running | Starting | Initializing | Degraded | Timeout | NotResponding
            ),
            // Degraded stays Degraded on repeat failures; only the sample
            // refresh is wanted.
            ProbeOutcome::Failing(_) => matches!(status, Running | Degraded),
            ProbeOutcome::Unreachable => {
                consecutive_unreachable >= max_unreachable
                    && matches!(status, Running | Degraded | Timeout)
            }
            ProbeOutcome::ProbeTimeout => matches!(status, Running | Degraded | Starting),
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerType;
    use std::collections::HashMap;

    fn test_config() -> Arc<ServerConfig> {
        Arc::new(ServerConfig {
            id: "probe-target".to_string(),
            server_type: ServerType::Custom,
            command: "true".to_string(),
            args: vec![],
            env: HashMap::new(),
            working_dir: None,
            port: 39991,
            health_endpoint: "/health".to_string(),
            probe_interval_secs: None,
        })
    }

    fn passing_outcome() -> ProbeOutcome {
        ProbeOutcome::Passing(HealthReport {
            metrics: HealthMetrics::default(),
            version: None,
        })
    }

    #[test]
    fn unreachable_needs_three_consecutive_results() {
        assert!(!HealthMonitor::should_deliver(
            ServerStatus::Running,
            &ProbeOutcome::Unreachable,
            1,
            3
        ));
        assert!(!HealthMonitor::should_deliver(
            ServerStatus::Running,
            &ProbeOutcome::Unreachable,
            2,
            3
        ));
        assert!(HealthMonitor::should_deliver(
            ServerStatus::Running,
            &ProbeOutcome::Unreachable,
            3,
            3
        ));
    }

    #[test]
    fn timeout_escalates_immediately_but_not_from_timeout() {
        assert!(HealthMonitor::should_deliver(
            ServerStatus::Running,
            &ProbeOutcome::ProbeTimeout,
            0,
            3
        ));
        assert!(!HealthMonitor::should_deliver(
            ServerStatus::Timeout,
            &ProbeOutcome::ProbeTimeout,
            0,
            3
        ));
    }

    #[test]
    fn failing_is_dropped_outside_running_and_degraded() {
        let failing = ProbeOutcome::Failing(HealthReport {
            metrics: HealthMetrics::default(),
            version: None,
        });
        assert!(HealthMonitor::should_deliver(
            ServerStatus::Running,
            &failing,
            0,
            3
        ));
        assert!(!HealthMonitor::should_deliver(
            ServerStatus::Starting,
            &failing,
            0,
            3
        ));
    }

    #[tokio::test]
    async fn suppressed_statuses_are_never_probed() {
        let mut mock = MockHealthProbe::new();
        // A probe call while MAINTENANCE would trip this expectation.
        mock.expect_probe().times(0);

        let (status_tx, status_rx) = watch::channel((ServerStatus::Maintenance, 0u64));
        let (report_tx, mut report_rx) = tokio::sync::mpsc::unbounded_channel();

        let monitor_config = MonitorConfig {
            probe_interval_secs: 1,
            probe_timeout_secs: 1,
            max_unreachable: 3,
        };

        tokio::time::pause();
        let mut monitor = HealthMonitor::spawn(
            test_config(),
            monitor_config,
            Arc::new(mock),
            status_rx,
            report_tx,
        );

        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert!(report_rx.try_recv().is_err());

        monitor.stop();
        drop(status_tx);
    }

    #[tokio::test]
    async fn passing_probe_is_reported_with_launch_revision() {
        let mut mock = MockHealthProbe::new();
        mock.expect_probe().returning(|_, _| passing_outcome());

        let (status_tx, status_rx) = watch::channel((ServerStatus::Starting, 7u64));
        let (report_tx, mut report_rx) = tokio::sync::mpsc::unbounded_channel();

        let monitor_config = MonitorConfig {
            probe_interval_secs: 1,
            probe_timeout_secs: 1,
            max_unreachable: 3,
        };

        let mut monitor = HealthMonitor::spawn(
            test_config(),
            monitor_config,
            Arc::new(mock),
            status_rx,
            report_tx,
        );

        let report = report_rx.recv().await.expect("expected a probe report");
        assert_eq!(report.id, "probe-target");
        assert_eq!(report.revision, 7);
        assert!(matches!(report.outcome, ProbeOutcome::Passing(_)));

        monitor.stop();
        drop(status_tx);
    }
}
