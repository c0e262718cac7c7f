//! Health sample types reported by probes and the host-level resource
//! summary included in fleet snapshots.

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// A point-in-time sample of one server's runtime health.
///
/// Produced by decoding the JSON document the server's health endpoint
/// returns. Missing fields default to zero so a minimal `{}` body decodes
/// as an all-clear sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthMetrics {
    /// CPU utilization percent, 0..=100.
    pub cpu_percent: f64,
    /// Bytes of memory in use.
    pub memory_used: u64,
    /// Bytes of memory available to the server; 0 when unreported.
    pub memory_total: u64,
    /// Currently open client connections.
    pub active_connections: u64,
    /// Cumulative requests served.
    pub request_count: u64,
    /// Cumulative request errors.
    pub error_count: u64,
    /// Latency of the most recent response, in milliseconds.
    pub latency_ms: u64,
}

impl HealthMetrics {
    /// Memory usage as a percentage; 0 when the total is unreported.
    pub fn memory_usage_percent(&self) -> f64 {
        if self.memory_total == 0 {
            0.0
        } else {
            self.memory_used as f64 / self.memory_total as f64 * 100.0
        }
    }

    /// Error rate as a percentage of requests; 0 when no requests yet.
    pub fn error_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.request_count as f64 * 100.0
        }
    }

    /// The health predicate: cpu strictly below 90, memory usage strictly
    /// below 85 percent, error rate strictly below 5 percent, and latency
    /// strictly below 5000ms. All four must hold.
    pub fn is_passing(&self) -> bool {
        self.cpu_percent < 90.0
            && self.memory_usage_percent() < 85.0
            && self.error_rate() < 5.0
            && self.latency_ms < 5000
    }
}

/// Host-level resource usage included in each fleet snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    /// Host CPU utilization percent across all cores.
    pub cpu_percent: f64,
    /// Host memory in use, bytes.
    pub memory_used: u64,
    /// Host memory total, bytes.
    pub memory_total: u64,
    /// Number of processes on the host.
    pub process_count: usize,
}

impl SystemStatus {
    /// Samples the host via `sysinfo`.
    pub fn sample(system: &mut System) -> Self {
        system.refresh_cpu_usage();
        system.refresh_memory();
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
        Self {
            cpu_percent: system.global_cpu_usage() as f64,
            memory_used: system.used_memory(),
            memory_total: system.total_memory(),
            process_count: system.processes().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_ratios_handle_zero_denominators() {
        let metrics = HealthMetrics::default();
        assert_eq!(metrics.memory_usage_percent(), 0.0);
        assert_eq!(metrics.error_rate(), 0.0);
        assert!(metrics.is_passing());
    }
}
