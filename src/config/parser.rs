use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The closed set of MCP server kinds the supervisor knows how to manage.
///
/// The kind determines which request capabilities the server is expected to
/// expose (see [`crate::capability`]); it does not change how the process is
/// launched or probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    /// File access server (tools + resources).
    Filesystem,
    /// URL fetching server (tools only).
    Fetch,
    /// Knowledge/memory server (tools + resources).
    Memory,
    /// Database-backed server (tools + resources + prompts).
    Database,
    /// Anything else; assumed to support tools only.
    Custom,
}

impl std::fmt::Display for ServerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerType::Filesystem => "filesystem",
            ServerType::Fetch => "fetch",
            ServerType::Memory => "memory",
            ServerType::Database => "database",
            ServerType::Custom => "custom",
        };
        write!(f, "{}", s)
    }
}

fn default_health_endpoint() -> String {
    "/health".to_string()
}

/// Configuration for a single supervised MCP server.
///
/// This structure defines how to launch and probe one server process: the
/// command to execute, any arguments and environment to pass, the port the
/// server listens on, and the path of its health endpoint. A `ServerConfig`
/// is immutable once registered with the supervisor.
///
/// # Examples
///
/// Basic server configuration:
///
/// ```
/// use mcp_supervisor::config::{ServerConfig, ServerType};
/// use std::collections::HashMap;
///
/// let server_config = ServerConfig {
///     id: "files".to_string(),
///     server_type: ServerType::Filesystem,
///     command: "node".to_string(),
///     args: vec!["server.js".to_string()],
///     env: HashMap::new(),
///     working_dir: None,
///     port: 3000,
///     health_endpoint: "/health".to_string(),
///     probe_interval_secs: None,
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Unique identifier for the server within the fleet.
    pub id: String,

    /// Kind of MCP server; one of a closed set.
    #[serde(rename = "type")]
    pub server_type: ServerType,

    /// Command to execute when starting the server.
    /// This can be an absolute path or a command available in the PATH.
    pub command: String,

    /// Command-line arguments to pass to the server.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables to set when launching the server.
    /// These will be combined with the current environment.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory for the launched process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// TCP port the server listens on; the health probe targets this port.
    pub port: u16,

    /// Path of the HTTP health endpoint, probed as
    /// `http://127.0.0.1:{port}{health_endpoint}`.
    #[serde(default = "default_health_endpoint")]
    pub health_endpoint: String,

    /// Per-server override of the fleet-wide probe interval, in seconds.
    #[serde(default)]
    pub probe_interval_secs: Option<u64>,
}

impl ServerConfig {
    /// The URL the health monitor probes for this server.
    pub fn probe_url(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, self.health_endpoint)
    }
}

/// Health-monitoring settings shared by the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Seconds between probes of each server.
    pub probe_interval_secs: u64,
    /// Hard timeout for a single probe, in seconds.
    pub probe_timeout_secs: u64,
    /// Consecutive `Unreachable` probe results before escalating to
    /// NOT_RESPONDING. A probe timeout escalates immediately.
    pub max_unreachable: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 5,
            probe_timeout_secs: 3,
            max_unreachable: 3,
        }
    }
}

impl MonitorConfig {
    /// Probe interval as a `Duration`.
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// Probe timeout as a `Duration`.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Automatic-restart policy applied after an unsolicited process exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartConfig {
    /// Delay before the first automatic restart attempt, in seconds.
    /// Each subsequent attempt doubles the delay.
    pub base_delay_secs: u64,
    /// Ceiling for the doubled delay, in seconds.
    pub max_delay_secs: u64,
    /// Maximum automatic attempts before the server is left in ERROR and
    /// requires an explicit operator start.
    pub max_attempts: u32,
    /// Grace period allowed for a process to exit after SIGTERM before it
    /// is forcibly killed, in seconds.
    pub grace_timeout_secs: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 2,
            max_delay_secs: 60,
            max_attempts: 3,
            grace_timeout_secs: 5,
        }
    }
}

impl RestartConfig {
    /// Backoff delay for the given zero-based attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.min(31);
        let secs = self
            .base_delay_secs
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_secs);
        Duration::from_secs(secs)
    }

    /// Grace timeout as a `Duration`.
    pub fn grace_timeout(&self) -> Duration {
        Duration::from_secs(self.grace_timeout_secs)
    }
}

/// Bind settings for the HTTP control/query API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// Address to bind, e.g. `127.0.0.1`.
    pub address: String,
    /// Port to bind.
    pub port: u16,
}

/// Main configuration for the MCP Supervisor.
///
/// Holds the launch/probe configuration for every server in the fleet plus
/// the fleet-wide monitoring, restart, and API settings.
///
/// # JSON Schema
///
/// ```json
/// {
///   "servers": [
///     {
///       "id": "fetch",
///       "type": "fetch",
///       "command": "uvx",
///       "args": ["mcp-server-fetch"],
///       "port": 3001,
///       "healthEndpoint": "/health"
///     }
///   ],
///   "monitor": { "probeIntervalSecs": 5, "probeTimeoutSecs": 3, "maxUnreachable": 3 },
///   "restart": { "baseDelaySecs": 2, "maxDelaySecs": 60, "maxAttempts": 3, "graceTimeoutSecs": 5 },
///   "api": { "address": "127.0.0.1", "port": 8085 }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Configurations for every server in the fleet.
    pub servers: Vec<ServerConfig>,

    /// Fleet-wide health monitoring settings.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Automatic-restart policy.
    #[serde(default)]
    pub restart: RestartConfig,

    /// Optional HTTP API bind settings; the API is not started when absent.
    #[serde(default)]
    pub api: Option<ApiConfig>,
}

impl Config {
    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML; everything
    /// else is parsed as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The contents are not valid JSON/YAML
    /// * The document does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e))),
            _ => Self::parse_from_str(&content),
        }
    }

    /// Parses a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The string is not valid JSON
    /// * The JSON does not conform to the expected schema
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fleet_config() {
        let config_str = r#"{
            "servers": [
                {
                    "id": "filesystem",
                    "type": "filesystem",
                    "command": "npx",
                    "args": ["-y", "@modelcontextprotocol/server-filesystem", "/path/to/allowed/files"],
                    "port": 3000
                }
            ]
        }"#;

        let config = Config::parse_from_str(config_str).unwrap();

        assert_eq!(config.servers.len(), 1);
        let fs_config = &config.servers[0];
        assert_eq!(fs_config.id, "filesystem");
        assert_eq!(fs_config.server_type, ServerType::Filesystem);
        assert_eq!(fs_config.command, "npx");
        assert_eq!(
            fs_config.args,
            vec![
                "-y",
                "@modelcontextprotocol/server-filesystem",
                "/path/to/allowed/files"
            ]
        );
        // Defaults fill the omitted sections
        assert_eq!(fs_config.health_endpoint, "/health");
        assert_eq!(config.monitor.probe_interval_secs, 5);
        assert_eq!(config.restart.max_attempts, 3);
        assert!(config.api.is_none());
    }

    #[test]
    fn test_backoff_delays_double_and_cap() {
        let restart = RestartConfig::default();
        assert_eq!(restart.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(restart.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(restart.delay_for_attempt(2), Duration::from_secs(8));
        assert_eq!(restart.delay_for_attempt(10), Duration::from_secs(60));
    }
}
